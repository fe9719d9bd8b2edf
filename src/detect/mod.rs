//! Truck detection on stored photos.
//!
//! A [`Detector`] is the remote (or fake) vision call: it takes a stored
//! photo reference and returns labeled instances. [`DetectionAggregator`]
//! turns those instances into the truck count written to the record store.

mod aggregate;
mod backend;
mod backends;
mod result;

pub use aggregate::{combine, DetectionAggregator, DEFAULT_TRUCK_LABELS};
pub use backend::{build_detector, Detector, DetectorKind, DetectorSettings};
#[cfg(feature = "rekognition")]
pub use backends::RekognitionDetector;
pub use backends::StubDetector;
pub use result::{DetectedInstance, TruckCount};
