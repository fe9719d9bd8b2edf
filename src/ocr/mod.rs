//! Text extraction engines for the timestamp overlay.
//!
//! The timestamp resolver only sees the [`TextExtractor`] capability; any
//! OCR engine can sit behind it. An engine that cannot run (missing binary,
//! missing feature, `none` configured) reports [`OcrError::Unavailable`],
//! which the capture cycle treats exactly like unreadable text.

#[cfg(feature = "ocr-leptess")]
pub mod leptess;
pub mod tesseract;

use std::str::FromStr;
use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;

#[cfg(feature = "ocr-leptess")]
pub use self::leptess::LeptessExtractor;
pub use tesseract::TesseractCli;

#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine is not installed, not compiled in, or not configured.
    #[error("ocr engine unavailable: {0}")]
    Unavailable(String),

    #[error("ocr extraction failed: {0}")]
    Extraction(String),

    #[error("empty image: width or height is 0")]
    EmptyImage,
}

/// Single-call OCR capability: image region in, raw text out.
pub trait TextExtractor: Send + Sync {
    /// Engine identifier for logs.
    fn name(&self) -> &'static str;

    fn extract_text(&self, image: &RgbImage) -> Result<String, OcrError>;
}

/// Placeholder engine used when OCR is switched off.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOcr;

impl TextExtractor for NoOcr {
    fn name(&self) -> &'static str {
        "none"
    }

    fn extract_text(&self, _image: &RgbImage) -> Result<String, OcrError> {
        Err(OcrError::Unavailable("ocr disabled by configuration".into()))
    }
}

/// Configured OCR engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OcrEngine {
    Tesseract,
    Leptess,
    None,
}

impl FromStr for OcrEngine {
    type Err = crate::StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "tesseract" => Ok(OcrEngine::Tesseract),
            "leptess" => Ok(OcrEngine::Leptess),
            "none" => Ok(OcrEngine::None),
            other => Err(crate::StoreError::unsupported("ocr", other)),
        }
    }
}

/// Build the configured engine.
///
/// An engine that was not compiled in degrades to [`NoOcr`] with a warning,
/// since missing OCR only costs timestamp precision.
pub fn build_extractor(engine: OcrEngine, binary: &str) -> Arc<dyn TextExtractor> {
    match engine {
        OcrEngine::Tesseract => Arc::new(TesseractCli::new(binary)),
        #[cfg(feature = "ocr-leptess")]
        OcrEngine::Leptess => Arc::new(LeptessExtractor::new(None)),
        #[cfg(not(feature = "ocr-leptess"))]
        OcrEngine::Leptess => {
            log::warn!("ocr engine 'leptess' not compiled in (feature ocr-leptess); timestamps will be approximated");
            Arc::new(NoOcr)
        }
        OcrEngine::None => Arc::new(NoOcr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_names_parse() {
        assert_eq!("Tesseract".parse::<OcrEngine>().unwrap(), OcrEngine::Tesseract);
        assert_eq!(" none ".parse::<OcrEngine>().unwrap(), OcrEngine::None);
        let err = "easyocr".parse::<OcrEngine>().unwrap_err();
        assert!(err.to_string().contains("easyocr"));
    }

    #[test]
    fn no_ocr_is_unavailable() {
        let image = RgbImage::new(4, 4);
        let err = NoOcr.extract_text(&image).unwrap_err();
        assert!(matches!(err, OcrError::Unavailable(_)));
    }
}
