//! On-image timestamp resolution.
//!
//! Crops the overlay region out of a frame, runs it through a
//! [`TextExtractor`], searches the text for a pattern derived from a
//! strftime format, and converts the matched civil time from the site zone
//! into an absolute UTC instant.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use image::RgbImage;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming::local_to_utc;
use crate::ocr::{OcrError, TextExtractor};

/// Default overlay format.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Pixel rectangle `(left, top, right, bottom)`, right/bottom exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Cut the rectangle out of `image`, clamped to its bounds.
    ///
    /// A rectangle entirely outside the image yields an empty image.
    pub fn crop(&self, image: &RgbImage) -> RgbImage {
        let right = self.right.min(image.width());
        let bottom = self.bottom.min(image.height());
        let left = self.left.min(right);
        let top = self.top.min(bottom);
        image::imageops::crop_imm(image, left, top, right - left, bottom - top).to_image()
    }
}

impl From<[u32; 4]> for CropRect {
    fn from([left, top, right, bottom]: [u32; 4]) -> Self {
        Self::new(left, top, right, bottom)
    }
}

impl From<CropRect> for [u32; 4] {
    fn from(rect: CropRect) -> Self {
        [rect.left, rect.top, rect.right, rect.bottom]
    }
}

#[derive(Debug, Error)]
pub enum TimestampError {
    /// Extracted text holds no match for the configured pattern.
    #[error("timestamp not found; raw text: {raw_text:?}")]
    NotFound { raw_text: String },

    #[error(transparent)]
    OcrUnavailable(OcrError),

    /// The match parsed but names a local time that does not exist.
    #[error("invalid local time: {0}")]
    InvalidLocalTime(String),
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unsupported timestamp format code '%{0}'")]
    UnsupportedCode(char),

    /// Text in this format cannot be turned back into a date and time,
    /// e.g. `%I` without `%p`.
    #[error("timestamp format '{0}' does not pin down a date and time")]
    Incomplete(String),
}

/// Build the search regex for a strftime-like format.
///
/// Each supported code becomes a fixed-width group; every other character
/// is matched literally. The format must round-trip a sample instant.
pub fn pattern_from_format(format: &str) -> Result<Regex, FormatError> {
    let mut pattern = String::with_capacity(format.len() * 3);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            pattern.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
            continue;
        }
        let code = chars.next().ok_or(FormatError::UnsupportedCode('%'))?;
        let token = match code {
            'Y' => r"\d{4}",
            'y' | 'm' | 'd' | 'H' | 'I' | 'M' | 'S' => r"\d{2}",
            'p' => "[AaPp][Mm]",
            '%' => "%",
            other => return Err(FormatError::UnsupportedCode(other)),
        };
        pattern.push_str(token);
    }
    check_round_trip(format)?;
    // Built only from escaped literals and fixed tokens.
    Regex::new(&pattern).map_err(|_| FormatError::Incomplete(format.to_string()))
}

/// Render an afternoon instant and parse it back; only supported codes reach here.
fn check_round_trip(format: &str) -> Result<(), FormatError> {
    let incomplete = || FormatError::Incomplete(format.to_string());
    let sample = NaiveDate::from_ymd_opt(2024, 7, 9)
        .and_then(|date| date.and_hms_opt(14, 17, 0))
        .ok_or_else(incomplete)?;
    let rendered = sample.format(format).to_string();
    match NaiveDateTime::parse_from_str(&rendered, format) {
        Ok(parsed) if parsed == sample => Ok(()),
        _ => Err(incomplete()),
    }
}

/// Reads the capture time off a frame.
pub struct TimestampResolver {
    format: String,
    pattern: Regex,
    tz: Tz,
    extractor: Arc<dyn TextExtractor>,
}

impl TimestampResolver {
    pub fn new(
        format: &str,
        tz: Tz,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self, FormatError> {
        Ok(Self {
            format: format.to_string(),
            pattern: pattern_from_format(format)?,
            tz,
            extractor,
        })
    }

    /// Site zone used for overlay text and photo keys.
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn engine_name(&self) -> &'static str {
        self.extractor.name()
    }

    /// Resolve the absolute capture instant from the overlay in `crop`.
    pub fn resolve(&self, image: &RgbImage, crop: CropRect) -> Result<DateTime<Utc>, TimestampError> {
        let region = crop.crop(image);
        let text = self
            .extractor
            .extract_text(&region)
            .map_err(TimestampError::OcrUnavailable)?;
        self.parse_text(&text)
    }

    /// Match and convert already-extracted text.
    pub fn parse_text(&self, text: &str) -> Result<DateTime<Utc>, TimestampError> {
        let Some(found) = self.pattern.find(text) else {
            return Err(TimestampError::NotFound {
                raw_text: text.trim().to_string(),
            });
        };
        local_to_utc(found.as_str(), &self.format, self.tz)
            .map(|(_, utc)| utc)
            .map_err(|e| TimestampError::InvalidLocalTime(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    struct FixedText(&'static str);

    impl TextExtractor for FixedText {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn extract_text(&self, _image: &RgbImage) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    fn resolver(text: &'static str) -> TimestampResolver {
        TimestampResolver::new(DEFAULT_TIMESTAMP_FORMAT, New_York, Arc::new(FixedText(text)))
            .unwrap()
    }

    #[test]
    fn default_format_pattern() {
        let re = pattern_from_format(DEFAULT_TIMESTAMP_FORMAT).unwrap();
        assert_eq!(
            re.find("at 2024-07-09 14:17:10.5").unwrap().as_str(),
            "2024-07-09 14:17:10"
        );
        assert!(re.is_match("CAM1 2024-07-09 14:17:10 EDT"));
        assert!(!re.is_match("2024-7-09 14:17:10"));
    }

    #[test]
    fn literal_characters_are_escaped() {
        let re = pattern_from_format("%d.%m.%y [%H:%M]").unwrap();
        assert!(re.is_match("09.07.24 [14:17]"));
        assert!(!re.is_match("09x07x24 [14:17]"));
    }

    #[test]
    fn unknown_code_rejected() {
        let err = pattern_from_format("%Y-%j").unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedCode('j')));
        assert!(pattern_from_format("%Y %").is_err());
    }

    #[test]
    fn twelve_hour_clock_needs_meridiem() {
        let err = pattern_from_format("%Y-%m-%d %I:%M:%S").unwrap_err();
        assert!(matches!(err, FormatError::Incomplete(_)));
        assert!(pattern_from_format("%m-%d %H:%M:%S").is_err());

        let resolver = TimestampResolver::new(
            "%Y-%m-%d %I:%M:%S %p",
            New_York,
            Arc::new(FixedText("")),
        )
        .unwrap();
        let ts = resolver.parse_text("CAM2 2024-07-09 02:17:10 PM").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 7, 9, 18, 17, 10).unwrap());
    }

    #[test]
    fn summer_time_converts_to_utc() {
        let frame = RgbImage::new(64, 16);
        let ts = resolver("  2024-07-09 14:17:10\n")
            .resolve(&frame, CropRect::new(0, 0, 64, 16))
            .unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 7, 9, 18, 17, 10).unwrap());
    }

    #[test]
    fn winter_time_converts_to_utc() {
        let ts = resolver("").parse_text("x2024-01-09 08:00:00y").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 9, 13, 0, 0).unwrap());
    }

    #[test]
    fn missing_pattern_is_not_found() {
        let frame = RgbImage::new(64, 16);
        let err = resolver("l0ading...")
            .resolve(&frame, CropRect::new(0, 0, 64, 16))
            .unwrap_err();
        match err {
            TimestampError::NotFound { raw_text } => assert_eq!(raw_text, "l0ading..."),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn impossible_date_is_invalid_local_time() {
        let err = resolver("").parse_text("2024-02-31 10:00:00").unwrap_err();
        assert!(matches!(err, TimestampError::InvalidLocalTime(_)));
        // Spring-forward gap.
        let err = resolver("").parse_text("2024-03-10 02:30:00").unwrap_err();
        assert!(matches!(err, TimestampError::InvalidLocalTime(_)));
    }

    #[test]
    fn crop_clamps_to_image() {
        let frame = RgbImage::new(10, 10);
        assert_eq!(CropRect::new(5, 5, 50, 50).crop(&frame).dimensions(), (5, 5));
        assert_eq!(CropRect::new(20, 20, 30, 30).crop(&frame).dimensions(), (0, 0));
    }
}
