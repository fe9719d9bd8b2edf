use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;

use super::aggregate::DEFAULT_TRUCK_LABELS;
use super::backends::StubDetector;
use super::result::DetectedInstance;
use crate::error::StoreError;
use crate::photo::PhotoRef;

/// Vision collaborator: one inference call per stored photo.
///
/// Implementations may block on the network; callers impose timeouts.
pub trait Detector: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on the stored photo and return every labeled instance.
    fn infer(&self, photo: &PhotoRef) -> Result<Vec<DetectedInstance>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    Rekognition,
    Stub,
    None,
}

impl FromStr for DetectorKind {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "rekognition" => Ok(DetectorKind::Rekognition),
            "stub" => Ok(DetectorKind::Stub),
            "none" => Ok(DetectorKind::None),
            other => Err(StoreError::unsupported("detector", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    pub kind: DetectorKind,
    /// Labels whose instances count as trucks (case-insensitive).
    pub labels: Vec<String>,
    pub max_labels: i32,
    pub region: String,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            kind: DetectorKind::None,
            labels: DEFAULT_TRUCK_LABELS.iter().map(|l| l.to_string()).collect(),
            max_labels: 30,
            region: "us-east-1".to_string(),
        }
    }
}

/// Build the configured detector; `None` when detection is switched off.
pub fn build_detector(settings: &DetectorSettings) -> Result<Option<Arc<dyn Detector>>, StoreError> {
    match settings.kind {
        DetectorKind::None => Ok(None),
        DetectorKind::Stub => Ok(Some(Arc::new(StubDetector::default()))),
        #[cfg(feature = "rekognition")]
        DetectorKind::Rekognition => Ok(Some(Arc::new(
            super::backends::RekognitionDetector::connect(&settings.region, settings.max_labels)?,
        ))),
        #[cfg(not(feature = "rekognition"))]
        DetectorKind::Rekognition => Err(StoreError::not_compiled(
            "detector",
            "rekognition",
            "rekognition",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_kinds_parse() {
        assert_eq!("Rekognition".parse::<DetectorKind>().unwrap(), DetectorKind::Rekognition);
        assert_eq!("stub".parse::<DetectorKind>().unwrap(), DetectorKind::Stub);
        assert!("yolo".parse::<DetectorKind>().is_err());
    }

    #[test]
    fn none_builds_nothing() {
        let settings = DetectorSettings::default();
        assert!(build_detector(&settings).unwrap().is_none());
        let stub = DetectorSettings {
            kind: DetectorKind::Stub,
            ..DetectorSettings::default()
        };
        assert_eq!(build_detector(&stub).unwrap().unwrap().name(), "stub");
    }
}
