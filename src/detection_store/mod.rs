//! DetectionStore - Detection Event Persistence
//!
//! ## Responsibilities
//!
//! - Persist detections to SQLite (detections table), append-only
//! - Assign monotonic record ids and UTC timestamps on append
//! - Serve the count and recent-history aggregate queries
//!
//! Every operation borrows a connection from [`StoragePool`] for its
//! duration; the RAII guard returns it on every exit path, including
//! failures mid-query.

use crate::error::{Error, Result};
use crate::storage_pool::StoragePool;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// Detection record (matches detections table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub object_class: String,
    /// Meters from the sensor; None when the detector could not
    /// estimate a distance (stored as SQL NULL)
    pub distance: Option<f64>,
}

/// DetectionStore instance
#[derive(Clone)]
pub struct DetectionStore {
    pool: StoragePool,
}

impl DetectionStore {
    /// Create new DetectionStore
    pub fn new(pool: StoragePool) -> Self {
        Self { pool }
    }

    /// Create the detections table if this is a fresh database
    pub async fn init_schema(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS detections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                object_class TEXT NOT NULL,
                distance REAL
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        tracing::debug!("Detections schema ready");
        Ok(())
    }

    /// Append one detection.
    ///
    /// Assigns the id and timestamp here and returns the record exactly
    /// as stored. The insert either fully succeeds or leaves the table
    /// untouched.
    pub async fn append(&self, object_class: &str, distance: Option<f64>) -> Result<DetectionRecord> {
        let timestamp = Utc::now();

        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO detections (timestamp, object_class, distance)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(timestamp.to_rfc3339())
        .bind(object_class)
        .bind(distance)
        .execute(&mut *conn)
        .await?;

        let id = result.last_insert_rowid();

        tracing::debug!(
            id = id,
            object_class = %object_class,
            distance = ?distance,
            "Detection appended"
        );

        Ok(DetectionRecord {
            id,
            timestamp,
            object_class: object_class.to_string(),
            distance,
        })
    }

    /// Total number of stored detections
    pub async fn count(&self) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM detections")
            .fetch_one(&mut *conn)
            .await?;

        let count: i64 = row.try_get("n")?;
        Ok(count as u64)
    }

    /// Most recent detections, newest first, at most `limit` records
    pub async fn recent_history(&self, limit: u32) -> Result<Vec<DetectionRecord>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, object_class, distance
            FROM detections
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }
}

/// Convert database row to DetectionRecord
fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<DetectionRecord> {
    let timestamp_str: String = row.try_get("timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("stored timestamp unreadable: {e}")))?;

    Ok(DetectionRecord {
        id: row.try_get("id")?,
        timestamp,
        object_class: row.try_get("object_class")?,
        distance: row.try_get("distance")?,
    })
}
