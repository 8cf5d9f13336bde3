//! Batch snapshot store.

use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use tracing::{debug, info, instrument};

use parley_core::batch::{BatchRecord, BatchStatus};
use parley_core::ids::BatchId;

use crate::connection::ConnectionPool;
use crate::errors::{Result, StoreError};

/// Durable snapshot store for batch state.
///
/// Cheap to clone is not needed: callers share it behind an `Arc`.
pub struct BatchStore {
    pool: ConnectionPool,
}

impl BatchStore {
    /// Create a store over an already-migrated pool.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Write a full snapshot of the record, replacing any previous one.
    #[instrument(skip_all, fields(batch_id = %record.batch_id, status = %record.status))]
    pub fn save(&self, record: &BatchRecord) -> Result<()> {
        let conn = self.pool.get()?;
        let scenarios = serde_json::to_string(&record.scenarios).map_err(|e| corrupt(record, e))?;
        let results = serde_json::to_string(&record.results).map_err(|e| corrupt(record, e))?;
        let _ = conn.execute(
            "INSERT INTO batches
                 (batch_id, status, concurrency, total, completed, failed,
                  created_at, started_at, completed_at, scenarios, results)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(batch_id) DO UPDATE SET
                 status = excluded.status,
                 completed = excluded.completed,
                 failed = excluded.failed,
                 started_at = excluded.started_at,
                 completed_at = excluded.completed_at,
                 results = excluded.results",
            params![
                record.batch_id.as_str(),
                record.status.as_str(),
                record.concurrency as u32,
                record.total,
                record.completed,
                record.failed,
                record.created_at.to_rfc3339(),
                record.started_at.map(|t| t.to_rfc3339()),
                record.completed_at.map(|t| t.to_rfc3339()),
                scenarios,
                results,
            ],
        )?;
        debug!("snapshot saved");
        Ok(())
    }

    /// Load one batch snapshot, if present.
    pub fn load(&self, batch_id: &BatchId) -> Result<Option<BatchRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT batch_id, status, concurrency, total, completed, failed,
                    created_at, started_at, completed_at, scenarios, results
             FROM batches WHERE batch_id = ?1",
        )?;
        let mut rows = stmt.query(params![batch_id.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(decode_row(row)?)),
            None => Ok(None),
        }
    }

    /// Reconstruct the whole catalog, most recent first.
    #[instrument(skip(self))]
    pub fn load_all(&self) -> Result<Vec<BatchRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT batch_id, status, concurrency, total, completed, failed,
                    created_at, started_at, completed_at, scenarios, results
             FROM batches ORDER BY created_at DESC",
        )?;
        let mut records = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            records.push(decode_row(row)?);
        }
        info!(count = records.len(), "loaded batch catalog");
        Ok(records)
    }

    /// Delete one batch snapshot. Returns whether a row was removed.
    pub fn delete(&self, batch_id: &BatchId) -> Result<bool> {
        let conn = self.pool.get()?;
        let removed = conn.execute("DELETE FROM batches WHERE batch_id = ?1", params![
            batch_id.as_str()
        ])?;
        Ok(removed > 0)
    }
}

fn corrupt(record: &BatchRecord, e: serde_json::Error) -> StoreError {
    StoreError::Corrupt {
        batch_id: record.batch_id.to_string(),
        message: e.to_string(),
    }
}

fn decode_row(row: &Row<'_>) -> Result<BatchRecord> {
    let batch_id: String = row.get(0)?;
    let status_raw: String = row.get(1)?;
    let status = BatchStatus::parse(&status_raw).ok_or_else(|| StoreError::Corrupt {
        batch_id: batch_id.clone(),
        message: format!("unknown status '{status_raw}'"),
    })?;
    let scenarios_raw: String = row.get(9)?;
    let results_raw: String = row.get(10)?;

    Ok(BatchRecord {
        batch_id: BatchId::from(batch_id.clone()),
        status,
        concurrency: row.get::<_, u32>(2)? as usize,
        total: row.get(3)?,
        completed: row.get(4)?,
        failed: row.get(5)?,
        created_at: decode_time(&batch_id, row.get::<_, String>(6)?)?,
        started_at: row
            .get::<_, Option<String>>(7)?
            .map(|t| decode_time(&batch_id, t))
            .transpose()?,
        completed_at: row
            .get::<_, Option<String>>(8)?
            .map(|t| decode_time(&batch_id, t))
            .transpose()?,
        scenarios: serde_json::from_str(&scenarios_raw).map_err(|e| StoreError::Corrupt {
            batch_id: batch_id.clone(),
            message: format!("bad scenarios json: {e}"),
        })?,
        results: serde_json::from_str(&results_raw).map_err(|e| StoreError::Corrupt {
            batch_id: batch_id.clone(),
            message: format!("bad results json: {e}"),
        })?,
    })
}

fn decode_time(batch_id: &str, raw: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            batch_id: batch_id.to_owned(),
            message: format!("bad timestamp '{raw}': {e}"),
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
