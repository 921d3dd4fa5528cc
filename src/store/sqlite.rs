//! SQLite-backed [`ResultStore`].
//!
//! Writers are serialized by SQLite itself (WAL journal, busy timeout) so
//! concurrent ingestion calls share one pool without further locking.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::migrate;
use crate::models::{Issue, NewRecord, RecordStatus, StoredRecord};

use super::ResultStore;

const SELECT_COLUMNS: &str =
    "SELECT id, timestamp, source, status, issues_json, raw_text, latency_ms, created_at FROM results";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect_path(path).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn millis_to_datetime(ms: i64, column: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("invalid {} value: {}", column, ms))
}

fn row_to_record(row: &SqliteRow) -> Result<StoredRecord> {
    let status: String = row.get("status");
    let issues_json: String = row.get("issues_json");
    let issues: Vec<Issue> = serde_json::from_str(&issues_json)
        .with_context(|| format!("corrupt issues_json for record {}", row.get::<i64, _>("id")))?;
    let latency: i64 = row.get("latency_ms");

    Ok(StoredRecord {
        id: row.get("id"),
        timestamp: millis_to_datetime(row.get("timestamp"), "timestamp")?,
        source: row.get("source"),
        status: status.parse()?,
        issues,
        raw_text: row.get("raw_text"),
        latency_ms: latency.max(0) as u64,
        created_at: millis_to_datetime(row.get("created_at"), "created_at")?,
    })
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn insert(&self, record: &NewRecord) -> Result<StoredRecord> {
        let issues_json = serde_json::to_string(&record.issues)?;
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO results (timestamp, source, status, issues_json, raw_text, latency_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.timestamp.timestamp_millis())
        .bind(&record.source)
        .bind(record.status.as_str())
        .bind(&issues_json)
        .bind(&record.raw_text)
        .bind(i64::try_from(record.latency_ms).unwrap_or(i64::MAX))
        .bind(created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(StoredRecord {
            id: result.last_insert_rowid(),
            timestamp: record.timestamp,
            source: record.source.clone(),
            status: record.status,
            issues: record.issues.clone(),
            raw_text: record.raw_text.clone(),
            latency_ms: record.latency_ms,
            created_at,
        })
    }

    async fn recent_for_source(&self, source: &str, limit: usize) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE source = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(source)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn recent_problems(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE status != ? ORDER BY timestamp DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(RecordStatus::Ok.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn status_counts(&self) -> Result<BTreeMap<RecordStatus, u64>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM results GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = BTreeMap::new();
        for row in &rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            counts.insert(status.parse()?, n as u64);
        }
        Ok(counts)
    }
}
