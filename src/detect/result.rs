/// One labeled object returned by the detection collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedInstance {
    /// Label the instance was reported under (e.g. "Truck").
    pub label: String,
    /// Per-instance confidence, 0..=100.
    pub confidence: f64,
}

impl DetectedInstance {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Count/confidence pair produced for one photo.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TruckCount {
    pub truck_count: u32,
    /// Mean confidence of the counted instances; 0 when none were counted.
    pub avg_confidence: f64,
}
