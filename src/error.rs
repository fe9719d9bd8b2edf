//! Error kinds shared by the capture pipeline and the storage backends.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by photo stores, detection record stores and their factories.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No photo is stored under the key.
    #[error("no photo stored under key '{0}'")]
    PhotoNotFound(String),

    /// No detection record exists for the (camera, timestamp) pair.
    #[error("no detection record for {camera} at {timestamp}")]
    RecordNotFound {
        camera: String,
        timestamp: DateTime<Utc>,
    },

    /// Key cannot be mapped onto the backend (path separators, empty key).
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    /// Unrecognised backend type string, or a backend not compiled in.
    #[error("unsupported {kind} backend '{name}'{hint}")]
    UnsupportedBackend {
        kind: &'static str,
        name: String,
        hint: String,
    },

    /// Backend could not be reached or rejected the request.
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },

    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("image codec: {0}")]
    Image(#[from] image::ImageError),
}

impl StoreError {
    /// True for the "absent" outcomes of `load`, false for backend failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::PhotoNotFound(_) | StoreError::RecordNotFound { .. }
        )
    }

    pub(crate) fn unsupported(kind: &'static str, name: &str) -> Self {
        StoreError::UnsupportedBackend {
            kind,
            name: name.to_string(),
            hint: String::new(),
        }
    }

    #[allow(dead_code)]
    pub(crate) fn not_compiled(kind: &'static str, name: &str, feature: &str) -> Self {
        StoreError::UnsupportedBackend {
            kind,
            name: name.to_string(),
            hint: format!(" (rebuild with `--features {}`)", feature),
        }
    }

    pub(crate) fn unavailable(backend: &'static str, reason: impl std::fmt::Display) -> Self {
        StoreError::Unavailable {
            backend,
            reason: reason.to_string(),
        }
    }
}

/// Errors that end (or partly fail) a single camera capture cycle.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Transport failure, non-2xx status or undecodable body.
    #[error("fetch from {url} failed: {reason}")]
    FetchFailed { url: String, reason: String },

    /// A step that needs the current frame ran before any successful fetch.
    #[error("camera {0} has no captured frame")]
    NoFrame(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Detection collaborator failed; the persisted photo is kept.
    #[error("truck detection failed: {0}")]
    DetectionFailed(String),

    /// The cycle's worker thread panicked.
    #[error("capture panicked: {0}")]
    Panicked(String),
}
