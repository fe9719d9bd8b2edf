//! Capture cycles over cameras and batches over terminals.
//!
//! A cycle is fetch, resolve, persist, then optionally detect. Persist and
//! detect are independent: a detection failure is reported in the cycle
//! report while the photo stays stored.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};

use crate::camera::{Camera, TimestampSource};
use crate::detect::DetectionAggregator;
use crate::error::CaptureError;
use crate::fetch::ImageFetcher;
use crate::photo::PhotoStore;
use crate::records::{DetectionRecord, DetectionStore};
use crate::terminal::Terminal;
use crate::timestamp::TimestampResolver;

/// Detector plus the record store its results go to.
pub struct DetectionStage {
    aggregator: DetectionAggregator,
    store: Arc<dyn DetectionStore>,
}

impl DetectionStage {
    pub fn new(aggregator: DetectionAggregator, store: Arc<dyn DetectionStore>) -> Self {
        Self { aggregator, store }
    }
}

#[derive(Debug)]
pub enum DetectionOutcome {
    Skipped,
    Recorded(DetectionRecord),
    Failed(CaptureError),
}

#[derive(Debug)]
pub struct CycleReport {
    pub camera: String,
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub ts_approx: bool,
    pub detection: DetectionOutcome,
}

#[derive(Debug)]
pub struct CameraFailure {
    pub camera: String,
    pub error: CaptureError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub attempted: usize,
    pub cycles: Vec<CycleReport>,
    pub failures: Vec<CameraFailure>,
}

impl BatchReport {
    /// True when cameras were attempted and none produced a stored photo.
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.cycles.is_empty()
    }
}

pub struct Pipeline {
    fetcher: Arc<dyn ImageFetcher>,
    resolver: TimestampResolver,
    detection: Option<DetectionStage>,
}

impl Pipeline {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, resolver: TimestampResolver) -> Self {
        Self {
            fetcher,
            resolver,
            detection: None,
        }
    }

    pub fn with_detection(mut self, stage: DetectionStage) -> Self {
        self.detection = Some(stage);
        self
    }

    pub fn detects(&self) -> bool {
        self.detection.is_some()
    }

    /// Run one cycle for `camera`.
    ///
    /// Errors before the photo is stored abort the cycle; detection
    /// problems come back as [`DetectionOutcome::Failed`].
    pub fn capture(
        &self,
        camera: &mut Camera,
        photos: &dyn PhotoStore,
    ) -> Result<CycleReport, CaptureError> {
        camera.fetch(self.fetcher.as_ref())?;
        if camera.resolve_timestamp(&self.resolver)? == TimestampSource::Approximated {
            log::debug!("{}: continuing with approximate timestamp", camera.full_name());
        }
        let stored = camera.persist(photos, self.resolver.timezone())?;

        let detection = match &self.detection {
            None => DetectionOutcome::Skipped,
            Some(stage) => match Self::detect(stage, camera, photos) {
                Ok(record) => DetectionOutcome::Recorded(record),
                Err(e) => {
                    log::warn!("{}: detection failed: {}", camera.full_name(), e);
                    DetectionOutcome::Failed(e)
                }
            },
        };

        Ok(CycleReport {
            camera: camera.full_name().to_string(),
            key: stored.key,
            timestamp: stored.timestamp,
            ts_approx: stored.ts_approx,
            detection,
        })
    }

    fn detect(
        stage: &DetectionStage,
        camera: &mut Camera,
        photos: &dyn PhotoStore,
    ) -> Result<DetectionRecord, CaptureError> {
        let photo = camera.photo_ref(photos)?;
        let count = stage.aggregator.count_trucks(&photo)?;
        let record = camera.record_detection(count, stage.store.as_ref())?;
        log::info!(
            "{}: {} trucks (avg {:.2}) recorded via {}",
            record.camera,
            record.truck_count,
            record.avg_confidence,
            stage.store.name()
        );
        Ok(record)
    }

    /// One cycle for every camera of every terminal, cameras in parallel.
    ///
    /// A failing camera is logged and reported; its siblings still run.
    pub fn run_batch(&self, terminals: &mut [Terminal]) -> BatchReport {
        let mut report = BatchReport::default();
        thread::scope(|scope| {
            let mut handles = Vec::new();
            for terminal in terminals.iter_mut() {
                let (photos, cameras) = terminal.split_mut();
                for camera in cameras.iter_mut() {
                    let name = camera.full_name().to_string();
                    let handle = scope.spawn(move || self.capture(camera, photos));
                    handles.push((name, handle));
                }
            }

            report.attempted = handles.len();
            for (camera, handle) in handles {
                match handle.join() {
                    Ok(Ok(cycle)) => report.cycles.push(cycle),
                    Ok(Err(error)) => {
                        log::error!("{}: capture failed: {}", camera, error);
                        report.failures.push(CameraFailure { camera, error });
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        log::error!("{}: capture thread panicked: {}", camera, message);
                        report.failures.push(CameraFailure {
                            camera,
                            error: CaptureError::Panicked(message),
                        });
                    }
                }
            }
        });
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectedInstance, StubDetector, DEFAULT_TRUCK_LABELS};
    use crate::ocr::NoOcr;
    use crate::photo::LocalPhotoStore;
    use crate::records::SqliteDetectionStore;
    use crate::timestamp::{CropRect, DEFAULT_TIMESTAMP_FORMAT};
    use chrono_tz::America::New_York;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    struct StaticFetcher(Vec<u8>);

    impl ImageFetcher for StaticFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, CaptureError> {
            if url.contains("broken") {
                panic!("decoder bug");
            }
            if url.contains("offline") {
                return Err(CaptureError::FetchFailed {
                    url: url.to_string(),
                    reason: "connection refused".into(),
                });
            }
            Ok(self.0.clone())
        }
    }

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn pipeline() -> Pipeline {
        let resolver =
            TimestampResolver::new(DEFAULT_TIMESTAMP_FORMAT, New_York, Arc::new(NoOcr)).unwrap();
        Pipeline::new(Arc::new(StaticFetcher(png())), resolver)
    }

    fn labels() -> Vec<String> {
        DEFAULT_TRUCK_LABELS.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn detection_failure_keeps_photo() {
        let dir = tempfile::tempdir().unwrap();
        let photos = LocalPhotoStore::open(dir.path()).unwrap();
        let records = Arc::new(SqliteDetectionStore::open_in_memory().unwrap());
        let aggregator =
            DetectionAggregator::new(Arc::new(StubDetector::failing("service down")), &labels());
        let pipeline = pipeline().with_detection(DetectionStage::new(aggregator, records));

        let mut camera = Camera::new("Main Gate", "Lane 1", "http://cams/1", CropRect::new(0, 0, 4, 1));
        let report = pipeline.capture(&mut camera, &photos).unwrap();
        assert!(matches!(report.detection, DetectionOutcome::Failed(CaptureError::DetectionFailed(_))));
        assert!(dir.path().join(&report.key).exists());
        assert!(report.ts_approx);
    }

    #[test]
    fn detection_record_matches_key_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let photos = LocalPhotoStore::open(dir.path()).unwrap();
        let records = Arc::new(SqliteDetectionStore::open_in_memory().unwrap());
        let detector = StubDetector::new(vec![
            DetectedInstance::new("Truck", 90.0),
            DetectedInstance::new("Truck", 80.0),
        ]);
        let aggregator = DetectionAggregator::new(Arc::new(detector), &labels());
        let pipeline = pipeline().with_detection(DetectionStage::new(aggregator, records.clone()));

        let mut camera = Camera::new("Main Gate", "Lane 1", "http://cams/1", CropRect::new(0, 0, 4, 1));
        let report = pipeline.capture(&mut camera, &photos).unwrap();
        let DetectionOutcome::Recorded(record) = report.detection else {
            panic!("expected a record, got {:?}", report.detection);
        };
        assert_eq!(record.truck_count, 2);
        assert_eq!(record.avg_confidence, 85.0);
        assert!(record.ts_approx);

        let parsed = crate::naming::parse_photo_key(&report.key, New_York).unwrap();
        assert_eq!(parsed.timestamp, record.timestamp);
        assert_eq!(report.timestamp, record.timestamp);
        assert_eq!(parsed.full_name, record.camera);
        assert_eq!(records.load(&record.camera, record.timestamp).unwrap(), record);
    }

    #[test]
    fn batch_isolates_failing_camera() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn PhotoStore> = Arc::new(LocalPhotoStore::open(dir.path()).unwrap());
        let mut terminal = Terminal::new("Main Gate", store).unwrap();
        let crop = CropRect::new(0, 0, 4, 1);
        for (name, url) in [("Lane 1", "http://cams/1"), ("Lane 2", "http://offline/2")] {
            terminal
                .add_camera(
                    &crate::terminal::CameraDescriptor {
                        name: name.into(),
                        url: url.into(),
                        crop: None,
                    },
                    crop,
                )
                .unwrap();
        }

        let mut terminals = vec![terminal];
        let report = pipeline().run_batch(&mut terminals);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.cycles[0].camera, "main_gate_lane_1");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].camera, "main_gate_lane_2");
        assert!(!report.all_failed());
    }

    #[test]
    fn panicking_camera_is_reported_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn PhotoStore> = Arc::new(LocalPhotoStore::open(dir.path()).unwrap());
        let mut terminal = Terminal::new("Main Gate", store).unwrap();
        for (name, url) in [("Lane 1", "http://cams/1"), ("Lane 3", "http://broken/3")] {
            terminal
                .add_camera(
                    &crate::terminal::CameraDescriptor {
                        name: name.into(),
                        url: url.into(),
                        crop: None,
                    },
                    CropRect::new(0, 0, 4, 1),
                )
                .unwrap();
        }

        let mut terminals = vec![terminal];
        let report = pipeline().run_batch(&mut terminals);
        assert_eq!(report.attempted, report.cycles.len() + report.failures.len());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].camera, "main_gate_lane_3");
        assert!(matches!(
            report.failures[0].error,
            CaptureError::Panicked(ref m) if m == "decoder bug"
        ));
    }
}
