use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{DetectorKind, DetectorSettings, DEFAULT_TRUCK_LABELS};
use crate::naming::canonicalize;
use crate::ocr::OcrEngine;
use crate::photo::{PhotoBackendKind, PhotoStoreSettings};
use crate::records::{RecordBackendKind, RecordStoreSettings, ServerSettings};
use crate::terminal::TerminalDescriptor;
use crate::timestamp::{pattern_from_format, CropRect, DEFAULT_TIMESTAMP_FORMAT};

const DEFAULT_TIMEZONE: &str = "America/New_York";
const DEFAULT_CROP: [u32; 4] = [0, 0, 400, 40];
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TESSERACT_BINARY: &str = "tesseract";
const DEFAULT_IMAGES_PATH: &str = "./images";
const DEFAULT_BUCKET: &str = "wando-warden";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_SQLITE_PATH: &str = "truck_detections.db";
const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DATABASE: &str = "warden";
const DEFAULT_DYNAMODB_TABLE: &str = "ww_truck_detections";
const DEFAULT_MAX_LABELS: i32 = 30;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct WardenConfigFile {
    timezone: Option<String>,
    timestamp_format: Option<String>,
    default_crop: Option<CropRect>,
    fetch: Option<FetchConfigFile>,
    ocr: Option<OcrConfigFile>,
    photo_store: Option<PhotoStoreConfigFile>,
    detection_store: Option<DetectionStoreConfigFile>,
    detector: Option<DetectorConfigFile>,
    #[serde(default)]
    terminals: Vec<TerminalDescriptor>,
}

#[derive(Debug, Deserialize, Default)]
struct FetchConfigFile {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OcrConfigFile {
    engine: Option<String>,
    binary: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PhotoStoreConfigFile {
    kind: Option<String>,
    path: Option<PathBuf>,
    bucket: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionStoreConfigFile {
    kind: Option<String>,
    sqlite_path: Option<PathBuf>,
    host: Option<String>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    table: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    kind: Option<String>,
    labels: Option<Vec<String>>,
    max_labels: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrSettings {
    pub engine: OcrEngine,
    pub binary: String,
}

#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub timezone: Tz,
    pub timestamp_format: String,
    pub default_crop: CropRect,
    pub fetch_timeout: Duration,
    pub ocr: OcrSettings,
    pub photo_store: PhotoStoreSettings,
    pub detection_store: RecordStoreSettings,
    pub detector: DetectorSettings,
    pub terminals: Vec<TerminalDescriptor>,
}

impl WardenConfig {
    /// Load from `WARDEN_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WARDEN_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WardenConfigFile) -> Result<Self> {
        let timezone = parse_timezone(file.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE))?;
        let timestamp_format = file
            .timestamp_format
            .unwrap_or_else(|| DEFAULT_TIMESTAMP_FORMAT.to_string());
        let default_crop = file.default_crop.unwrap_or(CropRect::from(DEFAULT_CROP));
        let fetch_timeout = Duration::from_secs(
            file.fetch
                .and_then(|fetch| fetch.timeout_secs)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        );

        let ocr_file = file.ocr.unwrap_or_default();
        let ocr = OcrSettings {
            engine: match ocr_file.engine.as_deref() {
                Some(engine) => engine.parse()?,
                None => OcrEngine::Tesseract,
            },
            binary: ocr_file
                .binary
                .unwrap_or_else(|| DEFAULT_TESSERACT_BINARY.to_string()),
        };

        let photo = file.photo_store.unwrap_or_default();
        let photo_store = PhotoStoreSettings {
            kind: match photo.kind.as_deref() {
                Some(kind) => kind.parse()?,
                None => PhotoBackendKind::Local,
            },
            path: photo
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGES_PATH)),
            bucket: photo.bucket.unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            region: photo.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
        };

        // host/user/password/database apply to whichever relational kind is chosen.
        let db = file.detection_store.unwrap_or_default();
        let server = ServerSettings {
            host: db.host.unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
            user: db.user,
            password: db.password,
            database: db.database.unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
        };
        let detection_store = RecordStoreSettings {
            kind: match db.kind.as_deref() {
                Some(kind) => kind.parse()?,
                None => RecordBackendKind::Sqlite,
            },
            sqlite_path: db
                .sqlite_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH)),
            mysql: server.clone(),
            postgres: server,
            dynamodb_table: db
                .table
                .unwrap_or_else(|| DEFAULT_DYNAMODB_TABLE.to_string()),
            region: db.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
        };

        let det = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            kind: match det.kind.as_deref() {
                Some(kind) => kind.parse()?,
                None => DetectorKind::None,
            },
            labels: det.labels.unwrap_or_else(|| {
                DEFAULT_TRUCK_LABELS.iter().map(|l| l.to_string()).collect()
            }),
            max_labels: det.max_labels.unwrap_or(DEFAULT_MAX_LABELS),
            region: photo_store.region.clone(),
        };

        Ok(Self {
            timezone,
            timestamp_format,
            default_crop,
            fetch_timeout,
            ocr,
            photo_store,
            detection_store,
            detector,
            terminals: file.terminals,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(kind) = env_value("WARDEN_STORAGE_TYPE") {
            self.photo_store.kind = kind.parse()?;
        }
        if let Some(kind) = env_value("WARDEN_DB_TYPE") {
            self.detection_store.kind = kind.parse()?;
        }
        if let Some(path) = env_value("LOCAL_STORAGE_PATH") {
            self.photo_store.path = PathBuf::from(path);
        }
        if let Some(bucket) = env_value("S3_BUCKET_NAME") {
            self.photo_store.bucket = bucket;
        }
        if let Some(region) = env_value("AWS_REGION") {
            self.photo_store.region = region.clone();
            self.detection_store.region = region.clone();
            self.detector.region = region;
        }
        if let Some(path) = env_value("SQLITE_DB_PATH") {
            self.detection_store.sqlite_path = PathBuf::from(path);
        }
        apply_server_env("MYSQL", &mut self.detection_store.mysql);
        apply_server_env("POSTGRES", &mut self.detection_store.postgres);
        if let Some(table) = env_value("DYNAMODB_TABLE") {
            self.detection_store.dynamodb_table = table;
        }
        if let Some(tz) = env_value("WARDEN_TIMEZONE") {
            self.timezone = parse_timezone(&tz)?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        pattern_from_format(&self.timestamp_format)
            .map_err(|e| anyhow!("timestamp_format '{}': {}", self.timestamp_format, e))?;

        if self.fetch_timeout.is_zero() {
            return Err(anyhow!("fetch.timeout_secs must be greater than zero"));
        }
        if self.detector.max_labels <= 0 {
            return Err(anyhow!("detector.max_labels must be greater than zero"));
        }
        self.detector.labels = self
            .detector
            .labels
            .iter()
            .map(|label| label.trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .collect();
        if self.detector.kind != DetectorKind::None && self.detector.labels.is_empty() {
            return Err(anyhow!("detector.labels must name at least one label"));
        }

        let mut seen = std::collections::HashSet::new();
        for terminal in &self.terminals {
            if canonicalize(&terminal.name).is_empty() {
                return Err(anyhow!("terminal name '{}' has no usable characters", terminal.name));
            }
            for camera in &terminal.cameras {
                if canonicalize(&camera.name).is_empty() {
                    return Err(anyhow!(
                        "camera '{}' at terminal '{}' has no usable characters",
                        camera.name,
                        terminal.name
                    ));
                }
                validate_camera_url(&camera.url)
                    .with_context(|| format!("camera '{}' at terminal '{}'", camera.name, terminal.name))?;
                let full = crate::naming::full_name(&terminal.name, &camera.name);
                if !seen.insert(full.clone()) {
                    return Err(anyhow!("duplicate camera full name '{}'", full));
                }
            }
        }
        Ok(())
    }

    /// Every configured camera's full name, in configuration order.
    pub fn camera_names(&self) -> Vec<String> {
        self.terminals
            .iter()
            .flat_map(|terminal| {
                terminal
                    .cameras
                    .iter()
                    .map(move |camera| crate::naming::full_name(&terminal.name, &camera.name))
            })
            .collect()
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn apply_server_env(prefix: &str, server: &mut ServerSettings) {
    if let Some(host) = env_value(&format!("{}_HOST", prefix)) {
        server.host = host;
    }
    if let Some(user) = env_value(&format!("{}_USER", prefix)) {
        server.user = Some(user);
    }
    if let Some(password) = env_value(&format!("{}_PASSWORD", prefix)) {
        server.password = Some(password);
    }
    if let Some(database) = env_value(&format!("{}_DATABASE", prefix)) {
        server.database = database;
    }
}

fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| anyhow!("unknown timezone '{}'", name))
}

fn validate_camera_url(raw: &str) -> Result<()> {
    let url = url::Url::parse(raw).map_err(|e| anyhow!("invalid camera url '{}': {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!("camera url scheme '{}' is not http(s)", other)),
    }
}

fn read_config_file(path: &Path) -> Result<WardenConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("read config {}: {}", path.display(), e))?;
    let cfg: WardenConfigFile =
        toml::from_str(&raw).map_err(|e| anyhow!("parse config {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<WardenConfig> {
        let file: WardenConfigFile = toml::from_str(raw)?;
        let mut cfg = WardenConfig::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[test]
    fn defaults_follow_deployment() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.timezone, chrono_tz::America::New_York);
        assert_eq!(cfg.timestamp_format, DEFAULT_TIMESTAMP_FORMAT);
        assert_eq!(cfg.photo_store.kind, PhotoBackendKind::Local);
        assert_eq!(cfg.photo_store.path, PathBuf::from("./images"));
        assert_eq!(cfg.photo_store.bucket, "wando-warden");
        assert_eq!(cfg.detection_store.kind, RecordBackendKind::Sqlite);
        assert_eq!(cfg.detection_store.sqlite_path, PathBuf::from("truck_detections.db"));
        assert_eq!(cfg.detection_store.dynamodb_table, "ww_truck_detections");
        assert_eq!(cfg.detection_store.mysql.database, "warden");
        assert_eq!(cfg.detector.kind, DetectorKind::None);
        assert_eq!(cfg.detector.labels, ["truck", "vehicle"]);
        assert_eq!(cfg.detector.max_labels, 30);
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(10));
        assert!(cfg.terminals.is_empty());
    }

    #[test]
    fn full_file() {
        let cfg = parse(
            r#"
            timezone = "America/Chicago"
            default_crop = [0, 0, 320, 32]

            [ocr]
            engine = "none"

            [photo_store]
            kind = "s3"
            bucket = "yard-photos"

            [detection_store]
            kind = "postgres"
            host = "db.internal"
            user = "warden"

            [detector]
            kind = "stub"
            labels = ["Truck", " Trailer "]

            [[terminals]]
            name = "Main Gate"

            [[terminals.cameras]]
            name = "Lane 1"
            url = "http://10.0.0.5/snapshot.jpg"

            [[terminals.cameras]]
            name = "Lane 2"
            url = "https://10.0.0.6/snapshot.jpg"
            crop = [10, 10, 200, 30]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.timezone, chrono_tz::America::Chicago);
        assert_eq!(cfg.ocr.engine, OcrEngine::None);
        assert_eq!(cfg.photo_store.kind, PhotoBackendKind::S3);
        assert_eq!(cfg.photo_store.bucket, "yard-photos");
        assert_eq!(cfg.detection_store.kind, RecordBackendKind::Postgres);
        assert_eq!(cfg.detection_store.postgres.host, "db.internal");
        assert_eq!(cfg.detection_store.postgres.user.as_deref(), Some("warden"));
        assert_eq!(cfg.detector.labels, ["truck", "trailer"]);
        assert_eq!(cfg.default_crop, CropRect::new(0, 0, 320, 32));
        assert_eq!(cfg.camera_names(), ["main_gate_lane_1", "main_gate_lane_2"]);
    }

    #[test]
    fn unknown_backend_is_unsupported() {
        let err = parse("[detection_store]\nkind = \"mongodb\"\n").unwrap_err();
        let store_err = err.downcast_ref::<crate::StoreError>().unwrap();
        assert!(matches!(store_err, crate::StoreError::UnsupportedBackend { .. }));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse("timezone = \"Mars/Olympus\"").is_err());
        assert!(parse("timestamp_format = \"%Y-%j\"").is_err());
        assert!(parse("timestamp_format = \"%Y-%m-%d %I:%M:%S\"").is_err());
        assert!(parse("[fetch]\ntimeout_secs = 0").is_err());
        assert!(parse("[detector]\nkind = \"stub\"\nlabels = []").is_err());
        assert!(parse(
            r#"
            [[terminals]]
            name = "Gate"
            [[terminals.cameras]]
            name = "Cam"
            url = "rtsp://10.0.0.5/live"
            "#
        )
        .is_err());
    }

    #[test]
    fn rejects_colliding_cameras() {
        let err = parse(
            r#"
            [[terminals]]
            name = "Main Gate"
            [[terminals.cameras]]
            name = "Lane 1"
            url = "http://a/1.jpg"
            [[terminals]]
            name = "main_gate"
            [[terminals.cameras]]
            name = "LANE  1"
            url = "http://a/2.jpg"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("main_gate_lane_1"), "{}", err);
    }
}
