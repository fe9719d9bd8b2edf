//! Detection record stores: truck counts keyed by (camera, timestamp).
//!
//! The (camera full name, absolute timestamp) pair is the natural key on
//! every backend. Timestamps are stored as UTC epoch milliseconds, the
//! same instant that is rendered into the matching photo key.

pub mod sqlite;
#[cfg(any(feature = "mysql", feature = "postgres"))]
pub mod sql;
#[cfg(feature = "dynamodb")]
pub mod dynamodb;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::detect::TruckCount;
use crate::error::StoreError;
use crate::naming::key_time_to_utc;

pub use sqlite::SqliteDetectionStore;

/// Table name shared by the relational backends.
pub const TABLE_NAME: &str = "truck_detections";

/// One detection run for one capture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub camera: String,
    pub timestamp: DateTime<Utc>,
    pub truck_count: u32,
    /// Mean instance confidence on a 0..=100 scale, two decimals.
    pub avg_confidence: f64,
    pub ts_approx: bool,
}

impl DetectionRecord {
    pub fn new(
        camera: impl Into<String>,
        timestamp: DateTime<Utc>,
        count: TruckCount,
        ts_approx: bool,
    ) -> Self {
        Self {
            camera: camera.into(),
            timestamp,
            truck_count: count.truck_count,
            avg_confidence: round_confidence(count.avg_confidence),
            ts_approx,
        }
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Round to the two decimals every backend preserves.
pub fn round_confidence(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::unavailable("record", format!("timestamp {} out of range", ms)))
}

pub(crate) fn count_from_db(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::unavailable("record", format!("truck_count {} out of range", value)))
}

/// Detection row as exported by earlier deployments: `timestamp` is a
/// key-style site-local time, possibly with the `_approx` suffix.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LegacyRecord {
    pub camera_name: String,
    pub timestamp: String,
    pub truck_count: u32,
    pub avg_confidence: f64,
}

impl LegacyRecord {
    pub fn into_record(self, tz: Tz) -> anyhow::Result<DetectionRecord> {
        let (timestamp, ts_approx) = key_time_to_utc(&self.timestamp, tz)?;
        Ok(DetectionRecord::new(
            self.camera_name,
            timestamp,
            TruckCount {
                truck_count: self.truck_count,
                avg_confidence: self.avg_confidence,
            },
            ts_approx,
        ))
    }
}

pub trait DetectionStore: Send + Sync {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Append the record for its (camera, timestamp).
    fn save(&self, record: &DetectionRecord) -> Result<(), StoreError>;

    /// Latest record for (camera, timestamp); [`StoreError::RecordNotFound`] if absent.
    fn load(&self, camera: &str, timestamp: DateTime<Utc>) -> Result<DetectionRecord, StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordBackendKind {
    Sqlite,
    MySql,
    Postgres,
    DynamoDb,
}

impl FromStr for RecordBackendKind {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "sqlite" => Ok(RecordBackendKind::Sqlite),
            "mysql" => Ok(RecordBackendKind::MySql),
            "postgres" | "postgresql" => Ok(RecordBackendKind::Postgres),
            "dynamodb" => Ok(RecordBackendKind::DynamoDb),
            other => Err(StoreError::unsupported("database", other)),
        }
    }
}

/// Connection parameters for a relational server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordStoreSettings {
    pub kind: RecordBackendKind,
    pub sqlite_path: PathBuf,
    pub mysql: ServerSettings,
    pub postgres: ServerSettings,
    pub dynamodb_table: String,
    pub region: String,
}

/// Open the configured detection record store.
pub fn open_record_store(
    settings: &RecordStoreSettings,
) -> Result<Arc<dyn DetectionStore>, StoreError> {
    match settings.kind {
        RecordBackendKind::Sqlite => Ok(Arc::new(SqliteDetectionStore::open(&settings.sqlite_path)?)),
        #[cfg(feature = "mysql")]
        RecordBackendKind::MySql => Ok(Arc::new(sql::MySqlDetectionStore::connect(&settings.mysql)?)),
        #[cfg(not(feature = "mysql"))]
        RecordBackendKind::MySql => Err(StoreError::not_compiled("database", "mysql", "mysql")),
        #[cfg(feature = "postgres")]
        RecordBackendKind::Postgres => Ok(Arc::new(sql::PostgresDetectionStore::connect(
            &settings.postgres,
        )?)),
        #[cfg(not(feature = "postgres"))]
        RecordBackendKind::Postgres => {
            Err(StoreError::not_compiled("database", "postgres", "postgres"))
        }
        #[cfg(feature = "dynamodb")]
        RecordBackendKind::DynamoDb => Ok(Arc::new(dynamodb::DynamoDbDetectionStore::connect(
            &settings.dynamodb_table,
            &settings.region,
        )?)),
        #[cfg(not(feature = "dynamodb"))]
        RecordBackendKind::DynamoDb => {
            Err(StoreError::not_compiled("database", "dynamodb", "dynamodb"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn kind_strings() {
        assert_eq!("SQLite".parse::<RecordBackendKind>().unwrap(), RecordBackendKind::Sqlite);
        assert_eq!("postgresql".parse::<RecordBackendKind>().unwrap(), RecordBackendKind::Postgres);
        assert_eq!("dynamodb".parse::<RecordBackendKind>().unwrap(), RecordBackendKind::DynamoDb);
        let err = "mongodb".parse::<RecordBackendKind>().unwrap_err();
        assert!(err.to_string().contains("mongodb"));
    }

    #[test]
    fn record_rounds_confidence() {
        let ts = Utc.with_ymd_and_hms(2024, 7, 9, 18, 17, 10).unwrap();
        let record = DetectionRecord::new(
            "main_gate_lane_1",
            ts,
            TruckCount {
                truck_count: 3,
                avg_confidence: 91.23456,
            },
            false,
        );
        assert_eq!(record.avg_confidence, 91.23);
        assert_eq!(record.timestamp_millis(), 1_720_549_030_000);
    }

    #[test]
    fn millis_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 7, 9, 18, 17, 10).unwrap();
        assert_eq!(millis_to_utc(ts.timestamp_millis()).unwrap(), ts);
        assert!(count_from_db(-1).is_err());
    }

    #[test]
    fn legacy_rows_convert_site_time() {
        let rows: Vec<LegacyRecord> = serde_json::from_str(
            r#"[
                {"camera_name": "main_gate_lane_1", "timestamp": "2024-07-09_14:17:10",
                 "truck_count": 3, "avg_confidence": 88.456},
                {"camera_name": "main_gate_lane_2", "timestamp": "2024-01-15_07:00:05_approx",
                 "truck_count": 0, "avg_confidence": 0}
            ]"#,
        )
        .unwrap();
        let tz = chrono_tz::America::New_York;
        let first = rows[0].clone().into_record(tz).unwrap();
        assert_eq!(first.timestamp, Utc.with_ymd_and_hms(2024, 7, 9, 18, 17, 10).unwrap());
        assert_eq!(first.avg_confidence, 88.46);
        assert!(!first.ts_approx);
        let second = rows[1].clone().into_record(tz).unwrap();
        assert!(second.ts_approx);
        assert_eq!(second.timestamp, Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 5).unwrap());
    }
}
