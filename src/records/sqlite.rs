use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{count_from_db, millis_to_utc, DetectionRecord, DetectionStore, TABLE_NAME};
use crate::error::StoreError;

const BACKEND: &str = "sqlite";

struct SqliteState {
    conn: Connection,
    schema_ready: bool,
}

/// Embedded-file record store.
pub struct SqliteDetectionStore {
    state: Mutex<SqliteState>,
}

impl SqliteDetectionStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path.as_ref())
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            state: Mutex::new(SqliteState {
                conn,
                schema_ready: false,
            }),
        }
    }

    /// Lock the connection, creating the table on first use.
    fn ready(&self) -> Result<MutexGuard<'_, SqliteState>, StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::unavailable(BACKEND, "connection lock poisoned"))?;
        if !state.schema_ready {
            ensure_schema(&state.conn)?;
            state.schema_ready = true;
        }
        Ok(state)
    }
}

fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          camera_name TEXT NOT NULL,
          timestamp INTEGER NOT NULL,
          truck_count INTEGER NOT NULL,
          avg_confidence REAL NOT NULL,
          ts_approx BOOLEAN NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_{table}_camera_ts ON {table}(camera_name, timestamp);
        "#,
        table = TABLE_NAME
    ))
    .map_err(|e| StoreError::unavailable(BACKEND, format!("create table: {}", e)))
}

impl DetectionStore for SqliteDetectionStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn save(&self, record: &DetectionRecord) -> Result<(), StoreError> {
        let state = self.ready()?;
        state
            .conn
            .execute(
                &format!(
                    r#"
                    INSERT INTO {}(camera_name, timestamp, truck_count, avg_confidence, ts_approx)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    TABLE_NAME
                ),
                params![
                    record.camera,
                    record.timestamp_millis(),
                    record.truck_count,
                    record.avg_confidence,
                    record.ts_approx
                ],
            )
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;
        Ok(())
    }

    fn load(&self, camera: &str, timestamp: DateTime<Utc>) -> Result<DetectionRecord, StoreError> {
        let state = self.ready()?;
        let row = state
            .conn
            .query_row(
                &format!(
                    r#"
                    SELECT timestamp, truck_count, avg_confidence, ts_approx FROM {}
                    WHERE camera_name = ?1 AND timestamp = ?2
                    ORDER BY id DESC LIMIT 1
                    "#,
                    TABLE_NAME
                ),
                params![camera, timestamp.timestamp_millis()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StoreError::unavailable(BACKEND, e))?;

        let Some((ms, truck_count, avg_confidence, ts_approx)) = row else {
            return Err(StoreError::RecordNotFound {
                camera: camera.to_string(),
                timestamp,
            });
        };
        Ok(DetectionRecord {
            camera: camera.to_string(),
            timestamp: millis_to_utc(ms)?,
            truck_count: count_from_db(truck_count)?,
            avg_confidence,
            ts_approx,
        })
    }
}
