//! # Sync Audit Log Repository
//!
//! The append-only audit trail behind operational dashboards.
//!
//! ## Append-Only Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every batch and every run appends rows; nothing is ever updated or    │
//! │  deleted here. The trail is the only durable record of partial         │
//! │  failures, so repositories and steps must not "fix up" old rows.       │
//! │                                                                         │
//! │  full_sync   STARTED    "sync started"                                 │
//! │  states      COMPLETED  "inserted=27 updated=0 failed=0"               │
//! │  customers   ERROR      "step failed: <cause>"                         │
//! │  full_sync   COMPLETED  "5 steps, 2 with failures"                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use cotar_core::{SyncRunRecord, SyncRunStatus};

/// Repository for the sync audit trail.
#[derive(Debug, Clone)]
pub struct SyncLogRepository {
    pool: SqlitePool,
}

impl SyncLogRepository {
    /// Creates a new SyncLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncLogRepository { pool }
    }

    /// Appends one audit row. The record is never mutated afterwards.
    pub async fn append(
        &self,
        run_type: &str,
        status: SyncRunStatus,
        message: &str,
    ) -> DbResult<SyncRunRecord> {
        let record = SyncRunRecord {
            id: Uuid::new_v4().to_string(),
            run_type: run_type.to_string(),
            status,
            message: message.to_string(),
            created_at: Utc::now(),
        };

        debug!(run_type = %run_type, status = ?status, "Appending sync run record");

        sqlx::query(
            r#"
            INSERT INTO sync_runs (id, run_type, status, message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&record.id)
        .bind(&record.run_type)
        .bind(record.status)
        .bind(&record.message)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    /// Most recent audit rows, newest first.
    pub async fn recent(&self, limit: u32) -> DbResult<Vec<SyncRunRecord>> {
        let records = sqlx::query_as::<_, SyncRunRecord>(
            r#"
            SELECT id, run_type, status, message, created_at
            FROM sync_runs
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Timestamp of the last COMPLETED row for a run type.
    ///
    /// The orchestrator reads this at startup so `status()` can report a
    /// last-sync time across restarts.
    pub async fn last_completed(&self, run_type: &str) -> DbResult<Option<DateTime<Utc>>> {
        let ts: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT created_at
            FROM sync_runs
            WHERE run_type = ?1 AND status = ?2
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(run_type)
        .bind(SyncRunStatus::Completed)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ts)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
