#[cfg(feature = "rekognition")]
pub mod rekognition;
pub mod stub;

#[cfg(feature = "rekognition")]
pub use rekognition::RekognitionDetector;
pub use stub::StubDetector;
