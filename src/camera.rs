//! One networked camera and its capture cycle.
//!
//! A cycle walks `Idle -> Fetched -> TimestampResolved | TimestampApproximated
//! -> Persisted -> Detected`. Each step checks the state left by the one
//! before it, so steps cannot run out of order on a stale frame.

use chrono::{DateTime, SubsecRound, Utc};
use chrono_tz::Tz;
use image::RgbImage;

use crate::detect::TruckCount;
use crate::error::CaptureError;
use crate::fetch::{decode_frame, ImageFetcher};
use crate::naming::{canonicalize, full_name, key_instant, photo_key};
use crate::photo::{PhotoRef, PhotoStore};
use crate::records::{DetectionRecord, DetectionStore};
use crate::timestamp::{CropRect, TimestampResolver};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Fetched,
    TimestampResolved,
    TimestampApproximated,
    Persisted,
    Detected,
}

/// How the current frame's timestamp was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampSource {
    Overlay,
    Approximated,
}

/// What [`Camera::persist`] wrote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredPhoto {
    /// Effective key, extension included.
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub ts_approx: bool,
}

pub struct Camera {
    terminal: String,
    name: String,
    full_name: String,
    url: String,
    crop: CropRect,
    frame: Option<RgbImage>,
    timestamp: Option<DateTime<Utc>>,
    ts_approx: bool,
    last_key: Option<String>,
    state: CaptureState,
}

impl Camera {
    pub fn new(terminal: &str, name: &str, url: &str, crop: CropRect) -> Self {
        Self {
            terminal: terminal.to_string(),
            name: name.to_string(),
            full_name: full_name(terminal, name),
            url: url.to_string(),
            crop,
            frame: None,
            timestamp: None,
            ts_approx: false,
            last_key: None,
            state: CaptureState::Idle,
        }
    }

    pub fn terminal(&self) -> &str {
        &self.terminal
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `{canonical_terminal}_{canonical_camera}`; prefix of every photo key.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// True when the camera name alone canonicalizes to nothing.
    pub fn has_empty_name(&self) -> bool {
        canonicalize(&self.name).is_empty()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn crop(&self) -> CropRect {
        self.crop
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn frame(&self) -> Option<&RgbImage> {
        self.frame.as_ref()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn ts_approx(&self) -> bool {
        self.ts_approx
    }

    /// Effective key (with extension) of the last persisted photo.
    pub fn last_key(&self) -> Option<&str> {
        self.last_key.as_deref()
    }

    /// Retrieve and decode a new frame, replacing the previous one.
    ///
    /// On failure the camera returns to `Idle` and keeps whatever it held
    /// from its last successful cycle.
    pub fn fetch(&mut self, fetcher: &dyn ImageFetcher) -> Result<(), CaptureError> {
        self.state = CaptureState::Idle;
        let bytes = fetcher.fetch(&self.url)?;
        let frame = decode_frame(&bytes).map_err(|e| CaptureError::FetchFailed {
            url: self.url.clone(),
            reason: format!("decode: {}", e),
        })?;
        log::debug!(
            "{}: fetched {}x{} frame",
            self.full_name,
            frame.width(),
            frame.height()
        );
        self.frame = Some(frame);
        self.state = CaptureState::Fetched;
        Ok(())
    }

    /// Read the overlay timestamp, or fall back to the current instant.
    ///
    /// Never fails because of OCR; only a missing frame is an error.
    pub fn resolve_timestamp(
        &mut self,
        resolver: &TimestampResolver,
    ) -> Result<TimestampSource, CaptureError> {
        self.resolve_timestamp_at(resolver, Utc::now())
    }

    fn resolve_timestamp_at(
        &mut self,
        resolver: &TimestampResolver,
        now: DateTime<Utc>,
    ) -> Result<TimestampSource, CaptureError> {
        let frame = match (&self.frame, self.state) {
            (Some(frame), CaptureState::Fetched) => frame,
            _ => return Err(CaptureError::NoFrame(self.full_name.clone())),
        };

        match resolver.resolve(frame, self.crop) {
            Ok(timestamp) => {
                self.timestamp = Some(timestamp);
                self.ts_approx = false;
                self.state = CaptureState::TimestampResolved;
                Ok(TimestampSource::Overlay)
            }
            Err(reason) => {
                // Whole seconds, folded onto the instant the key parses back to.
                let tz = resolver.timezone();
                let timestamp = key_instant(now.trunc_subsecs(0), tz);
                log::warn!(
                    "{}: overlay timestamp unreadable ({}), approximating with {}",
                    self.full_name,
                    reason,
                    timestamp.with_timezone(&tz)
                );
                self.timestamp = Some(timestamp);
                self.ts_approx = true;
                self.state = CaptureState::TimestampApproximated;
                Ok(TimestampSource::Approximated)
            }
        }
    }

    /// Save the current frame under its derived key.
    pub fn persist(&mut self, store: &dyn PhotoStore, tz: Tz) -> Result<StoredPhoto, CaptureError> {
        let timestamp = match (self.state, self.timestamp) {
            (CaptureState::TimestampResolved | CaptureState::TimestampApproximated, Some(ts)) => ts,
            _ => return Err(CaptureError::NoFrame(self.full_name.clone())),
        };
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| CaptureError::NoFrame(self.full_name.clone()))?;

        let key = photo_key(&self.full_name, timestamp, tz, self.ts_approx);
        let saved = store.save(frame, &key)?;
        log::info!("{}: saved {} via {}", self.full_name, saved, store.name());
        self.state = CaptureState::Persisted;
        self.last_key = Some(saved.clone());
        Ok(StoredPhoto {
            key: saved,
            timestamp,
            ts_approx: self.ts_approx,
        })
    }

    /// Reference to the persisted photo for the detection collaborator.
    pub fn photo_ref(&self, store: &dyn PhotoStore) -> Result<PhotoRef, CaptureError> {
        match (&self.last_key, self.state) {
            (Some(key), CaptureState::Persisted | CaptureState::Detected) => Ok(store.locate(key)?),
            _ => Err(CaptureError::NoFrame(self.full_name.clone())),
        }
    }

    /// Write a detection result for the persisted capture.
    ///
    /// The record carries exactly the timestamp embedded in the photo key.
    pub fn record_detection(
        &mut self,
        count: TruckCount,
        store: &dyn DetectionStore,
    ) -> Result<DetectionRecord, CaptureError> {
        let timestamp = match (self.state, self.timestamp) {
            (CaptureState::Persisted, Some(ts)) => ts,
            _ => return Err(CaptureError::NoFrame(self.full_name.clone())),
        };
        let record = DetectionRecord::new(self.full_name.clone(), timestamp, count, self.ts_approx);
        store.save(&record)?;
        self.state = CaptureState::Detected;
        Ok(record)
    }
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("full_name", &self.full_name)
            .field("url", &self.url)
            .field("crop", &self.crop)
            .field("state", &self.state)
            .field("timestamp", &self.timestamp)
            .field("ts_approx", &self.ts_approx)
            .field("last_key", &self.last_key)
            .finish()
    }
}
