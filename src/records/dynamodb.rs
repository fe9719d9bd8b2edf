//! Managed key-value record store on DynamoDB (feature `dynamodb`).
//!
//! The table is provisioned outside warden with `camera_name` (S) as the
//! partition key and `timestamp` (N, epoch milliseconds) as the sort key.
//! A save for an existing pair replaces the item.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};

use super::{count_from_db, millis_to_utc, DetectionRecord, DetectionStore};
use crate::error::StoreError;
use crate::runtime::{aws_config, BlockingRuntime};

const BACKEND: &str = "dynamodb";

pub struct DynamoDbDetectionStore {
    runtime: BlockingRuntime,
    client: Client,
    table: String,
}

impl DynamoDbDetectionStore {
    pub fn connect(table: &str, region: &str) -> Result<Self, StoreError> {
        if table.trim().is_empty() {
            return Err(StoreError::unavailable(BACKEND, "table name is empty"));
        }
        let runtime = BlockingRuntime::new(BACKEND)?;
        let config = aws_config(&runtime, region);
        log::info!("dynamodb record store: table={} region={}", table, region);
        Ok(Self {
            client: Client::new(&config),
            runtime,
            table: table.to_string(),
        })
    }
}

/// Item attributes for a record; confidence is written as a 2-decimal number.
pub fn record_item(record: &DetectionRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("camera_name".to_string(), AttributeValue::S(record.camera.clone())),
        (
            "timestamp".to_string(),
            AttributeValue::N(record.timestamp_millis().to_string()),
        ),
        (
            "truck_count".to_string(),
            AttributeValue::N(record.truck_count.to_string()),
        ),
        (
            "avg_confidence".to_string(),
            AttributeValue::N(format!("{:.2}", record.avg_confidence)),
        ),
        ("ts_approx".to_string(), AttributeValue::Bool(record.ts_approx)),
    ])
}

/// Inverse of [`record_item`].
pub fn item_record(
    camera: &str,
    item: &HashMap<String, AttributeValue>,
) -> Result<DetectionRecord, StoreError> {
    let ms: i64 = number(item, "timestamp")?;
    let truck_count: i64 = number(item, "truck_count")?;
    let avg_confidence: f64 = number(item, "avg_confidence")?;
    let ts_approx = item
        .get("ts_approx")
        .and_then(|value| value.as_bool().ok())
        .copied()
        .unwrap_or(false);

    Ok(DetectionRecord {
        camera: camera.to_string(),
        timestamp: millis_to_utc(ms)?,
        truck_count: count_from_db(truck_count)?,
        avg_confidence,
        ts_approx,
    })
}

fn number<T: std::str::FromStr>(
    item: &HashMap<String, AttributeValue>,
    name: &str,
) -> Result<T, StoreError> {
    let raw = item
        .get(name)
        .and_then(|value| value.as_n().ok())
        .ok_or_else(|| StoreError::unavailable(BACKEND, format!("item missing number '{}'", name)))?;
    raw.parse()
        .map_err(|_| StoreError::unavailable(BACKEND, format!("item has malformed '{}'", name)))
}

impl DetectionStore for DynamoDbDetectionStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn save(&self, record: &DetectionRecord) -> Result<(), StoreError> {
        self.runtime
            .block_on(
                self.client
                    .put_item()
                    .table_name(&self.table)
                    .set_item(Some(record_item(record)))
                    .send(),
            )
            .map_err(|e| StoreError::unavailable(BACKEND, format!("put_item: {}", e)))?;
        Ok(())
    }

    fn load(&self, camera: &str, timestamp: DateTime<Utc>) -> Result<DetectionRecord, StoreError> {
        let output = self
            .runtime
            .block_on(
                self.client
                    .get_item()
                    .table_name(&self.table)
                    .key("camera_name", AttributeValue::S(camera.to_string()))
                    .key(
                        "timestamp",
                        AttributeValue::N(timestamp.timestamp_millis().to_string()),
                    )
                    .send(),
            )
            .map_err(|e| StoreError::unavailable(BACKEND, format!("get_item: {}", e)))?;

        match output.item() {
            Some(item) => item_record(camera, item),
            None => Err(StoreError::RecordNotFound {
                camera: camera.to_string(),
                timestamp,
            }),
        }
    }
}
