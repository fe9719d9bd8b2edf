use std::sync::Arc;

use super::backend::Detector;
use super::result::{DetectedInstance, TruckCount};
use crate::error::CaptureError;
use crate::photo::PhotoRef;

/// Labels counted as trucks unless configured otherwise.
pub const DEFAULT_TRUCK_LABELS: [&str; 2] = ["truck", "vehicle"];

/// Count and mean confidence over `instances`.
pub fn combine<'a>(instances: impl IntoIterator<Item = &'a DetectedInstance>) -> TruckCount {
    let mut truck_count = 0u32;
    let mut total = 0.0;
    for instance in instances {
        truck_count += 1;
        total += instance.confidence;
    }
    let avg_confidence = if truck_count > 0 {
        total / f64::from(truck_count)
    } else {
        0.0
    };
    TruckCount {
        truck_count,
        avg_confidence,
    }
}

/// Runs the detector on a photo and keeps only truck-class instances.
pub struct DetectionAggregator {
    detector: Arc<dyn Detector>,
    labels: Vec<String>,
}

impl DetectionAggregator {
    pub fn new(detector: Arc<dyn Detector>, labels: &[String]) -> Self {
        Self {
            detector,
            labels: labels.iter().map(|l| l.trim().to_lowercase()).collect(),
        }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    fn is_truck(&self, instance: &DetectedInstance) -> bool {
        let label = instance.label.to_lowercase();
        self.labels.iter().any(|l| *l == label)
    }

    pub fn count_trucks(&self, photo: &PhotoRef) -> Result<TruckCount, CaptureError> {
        let instances = self
            .detector
            .infer(photo)
            .map_err(|e| CaptureError::DetectionFailed(format!("{} on {}: {:#}", self.detector.name(), photo, e)))?;
        let count = combine(instances.iter().filter(|i| self.is_truck(i)));
        log::debug!(
            "{}: {} of {} instances are trucks (avg {:.2})",
            photo,
            count.truck_count,
            instances.len(),
            count.avg_confidence
        );
        Ok(count)
    }
}
