use anyhow::{anyhow, Result};

use crate::detect::backend::Detector;
use crate::detect::result::DetectedInstance;
use crate::photo::PhotoRef;

/// Stub backend for testing and dry runs. Returns a fixed answer.
#[derive(Default)]
pub struct StubDetector {
    instances: Vec<DetectedInstance>,
    failure: Option<String>,
}

impl StubDetector {
    pub fn new(instances: Vec<DetectedInstance>) -> Self {
        Self {
            instances,
            ..Self::default()
        }
    }

    /// Stub whose every call fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }
}

impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&self, _photo: &PhotoRef) -> Result<Vec<DetectedInstance>> {
        match &self.failure {
            Some(reason) => Err(anyhow!("{}", reason)),
            None => Ok(self.instances.clone()),
        }
    }
}
