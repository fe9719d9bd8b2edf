//! Still-image retrieval from camera snapshot endpoints.
//!
//! A fetch is one blocking GET. Non-2xx statuses, transport errors, empty
//! or undecodable bodies all fail the cycle with
//! [`CaptureError::FetchFailed`]. Successful bodies are decoded and
//! normalized to 8-bit RGB.

use std::io::Read;
use std::time::Duration;

use image::RgbImage;

use crate::error::CaptureError;

/// Upper bound on a snapshot body.
const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Default per-request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of raw encoded image bytes for a camera URL.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, CaptureError>;
}

/// HTTP(S) fetcher backed by a shared `ureq` agent.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, CaptureError> {
        let failed = |reason: String| CaptureError::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(failed(format!("http status {}", code))),
            Err(e) => return Err(failed(e.to_string())),
        };

        read_body(response.into_reader(), MAX_IMAGE_BYTES).map_err(failed)
    }
}

/// Read a whole snapshot body, failing instead of truncating past `limit`.
fn read_body(reader: impl Read, limit: u64) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| format!("read body: {}", e))?;
    if bytes.len() as u64 > limit {
        return Err(format!("body exceeds {} MiB", limit / (1024 * 1024)));
    }
    if bytes.is_empty() {
        return Err("empty body".into());
    }
    Ok(bytes)
}

/// Decode an encoded image into three 8-bit channels.
pub fn decode_frame(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(bytes)?.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbaImage};
    use std::io::Cursor;

    #[test]
    fn decode_normalizes_to_rgb8() {
        let rgba = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 128]));
        let mut png = Vec::new();
        rgba.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let frame = decode_frame(&png).unwrap();
        assert_eq!(frame.dimensions(), (3, 2));
        assert_eq!(frame.get_pixel(1, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_frame(b"not an image").is_err());
    }

    #[test]
    fn oversized_body_is_rejected_not_truncated() {
        let body = vec![7u8; 2048];
        assert_eq!(read_body(Cursor::new(&body), 2048).unwrap().len(), 2048);

        let err = read_body(Cursor::new(&body), 2047).unwrap_err();
        assert!(err.starts_with("body exceeds"), "{}", err);
        let err = read_body(Cursor::new(vec![7u8; MAX_IMAGE_BYTES as usize + 1]), MAX_IMAGE_BYTES)
            .unwrap_err();
        assert_eq!(err, "body exceeds 20 MiB");
        assert_eq!(read_body(Cursor::new(Vec::new()), 2048).unwrap_err(), "empty body");
    }

    #[test]
    fn unreachable_host_is_fetch_failed() {
        let fetcher = HttpFetcher::new(Duration::from_millis(500));
        let err = fetcher.fetch("http://127.0.0.1:9/snapshot.jpg").unwrap_err();
        assert!(matches!(err, CaptureError::FetchFailed { .. }), "{:?}", err);
    }
}
