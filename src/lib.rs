//! Warden: camera capture-and-persist pipeline.
//!
//! Periodically pulls a still from each networked camera at each terminal,
//! reads the capture time off the on-image overlay, stores the photo under a
//! key derived from camera identity and time, and optionally records a truck
//! count for it.
//!
//! # Module Structure
//!
//! - `naming`: canonical camera names and photo keys
//! - `timestamp`, `ocr`: overlay timestamp resolution behind a text-extraction boundary
//! - `fetch`: snapshot retrieval
//! - `camera`, `terminal`: topology and the per-camera capture state machine
//! - `photo`: photo stores (local filesystem, S3)
//! - `records`: detection record stores (SQLite, MySQL, PostgreSQL, DynamoDB)
//! - `detect`: detection collaborator and truck count aggregation
//! - `pipeline`: capture cycles and concurrent batches
//! - `config`: TOML + environment configuration
//!
//! Photo keys have the form
//! `{canonical_terminal}_{canonical_camera}_{YYYY-MM-DD_HH:MM:SS}[_approx]`,
//! with the time rendered in the site zone. Detection records are keyed by
//! the same full name and the same absolute instant, so the two stores join
//! on (camera, timestamp).

pub mod camera;
pub mod config;
pub mod detect;
pub mod error;
pub mod fetch;
pub mod naming;
pub mod ocr;
pub mod photo;
pub mod pipeline;
pub mod records;
#[cfg(any(
    feature = "s3",
    feature = "dynamodb",
    feature = "rekognition",
    feature = "mysql",
    feature = "postgres"
))]
pub mod runtime;
pub mod terminal;
pub mod timestamp;

pub use camera::{Camera, CaptureState, StoredPhoto, TimestampSource};
pub use config::WardenConfig;
pub use detect::{DetectedInstance, DetectionAggregator, Detector, TruckCount};
pub use error::{CaptureError, StoreError};
pub use fetch::{HttpFetcher, ImageFetcher};
pub use naming::{canonicalize, full_name, parse_photo_key, photo_key};
pub use ocr::TextExtractor;
pub use photo::{open_photo_store, PhotoRef, PhotoStore};
pub use pipeline::{BatchReport, CycleReport, DetectionOutcome, DetectionStage, Pipeline};
pub use records::{open_record_store, DetectionRecord, DetectionStore};
pub use terminal::{build_terminals, CameraDescriptor, Terminal, TerminalDescriptor};
pub use timestamp::{CropRect, TimestampError, TimestampResolver};
