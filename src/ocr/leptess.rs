//! In-process Tesseract through `leptess` (feature `ocr-leptess`).

use std::path::PathBuf;

use image::{DynamicImage, RgbImage};

use super::{OcrError, TextExtractor};

pub struct LeptessExtractor {
    /// Tesseract data directory (None uses the system default).
    tessdata_path: Option<PathBuf>,
}

impl LeptessExtractor {
    pub fn new(tessdata_path: Option<PathBuf>) -> Self {
        Self { tessdata_path }
    }
}

impl TextExtractor for LeptessExtractor {
    fn name(&self) -> &'static str {
        "leptess"
    }

    fn extract_text(&self, image: &RgbImage) -> Result<String, OcrError> {
        let rgba = DynamicImage::ImageRgb8(image.clone()).to_rgba8();
        let (w, h) = (rgba.width(), rgba.height());
        if w == 0 || h == 0 {
            return Err(OcrError::EmptyImage);
        }

        let tessdata = self
            .tessdata_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string());

        // A fresh instance per call keeps the extractor Sync.
        let mut lt = ::leptess::LepTess::new(tessdata.as_deref(), "eng")
            .map_err(|e| OcrError::Unavailable(format!("tesseract init: {e}")))?;

        lt.set_image_from_mem(rgba.as_raw(), w as i32, h as i32, 4, (w * 4) as i32)
            .map_err(|_| OcrError::Extraction("set image from memory".to_string()))?;

        let text = lt
            .get_utf8_text()
            .map_err(|e| OcrError::Extraction(format!("{e}")))?;

        Ok(text.trim().to_string())
    }
}
