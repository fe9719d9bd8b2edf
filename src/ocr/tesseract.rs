//! Tesseract command-line engine.
//!
//! Runs `tesseract stdin stdout --oem 3 --psm 7` with the region encoded as
//! PNG on stdin. `--psm 7` treats the region as a single text line, which
//! matches a camera timestamp overlay.

use std::io::{Cursor, ErrorKind, Write};
use std::process::{Command, Stdio};

use image::{ImageFormat, RgbImage};

use super::{OcrError, TextExtractor};

pub struct TesseractCli {
    binary: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TextExtractor for TesseractCli {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn extract_text(&self, image: &RgbImage) -> Result<String, OcrError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(OcrError::EmptyImage);
        }

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| OcrError::Extraction(format!("encode region: {}", e)))?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "--oem", "3", "--psm", "7"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    OcrError::Unavailable(format!("'{}' not found on PATH", self.binary))
                }
                _ => OcrError::Unavailable(format!("spawn '{}': {}", self.binary, e)),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .map_err(|e| OcrError::Extraction(format!("write to tesseract: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| OcrError::Extraction(format!("wait for tesseract: {}", e)))?;
        if !output.status.success() {
            return Err(OcrError::Extraction(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_unavailable() {
        let engine = TesseractCli::new("warden-test-no-such-tesseract");
        let err = engine.extract_text(&RgbImage::new(8, 8)).unwrap_err();
        assert!(matches!(err, OcrError::Unavailable(_)), "{:?}", err);
    }

    #[test]
    fn empty_region_rejected_before_spawn() {
        let engine = TesseractCli::new("warden-test-no-such-tesseract");
        let err = engine.extract_text(&RgbImage::new(0, 8)).unwrap_err();
        assert!(matches!(err, OcrError::EmptyImage));
    }
}
