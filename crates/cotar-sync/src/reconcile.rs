//! # Upsert Reconciler
//!
//! Generic insert-or-update driver shared by every sync step.
//!
//! ## Batch Flow
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  existing keys ← one query against the local store             │
//! │  for each canonical record:                                    │
//! │     key ∈ existing ?  UPDATE … WHERE key  :  INSERT            │
//! │     per-record failure → fold into outcome.errors, continue    │
//! │  append one audit row summarizing the batch                    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A record failure never aborts the batch: sync runs report partial
//! success, not all-or-nothing failure. Only the existing-keys query
//! (without which nothing can be partitioned) propagates as an error.

use std::collections::HashSet;
use tracing::{debug, warn};

use cotar_core::SyncRunStatus;
use cotar_db::{DbResult, SyncLogRepository};

use crate::error::SyncResult;

// =============================================================================
// Batch Outcome
// =============================================================================

/// Counts and structured failures for one reconciled batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
    /// One entry per failed record; failures are values, never panics.
    pub errors: Vec<RecordError>,
}

/// A single record that could not be written.
#[derive(Debug, Clone)]
pub struct RecordError {
    pub key: String,
    pub reason: String,
}

impl BatchOutcome {
    /// Total records that were applied successfully.
    pub fn applied(&self) -> u64 {
        self.inserted + self.updated
    }

    /// Records a per-record failure.
    pub fn record_failure(&mut self, key: impl Into<String>, reason: impl ToString) {
        self.failed += 1;
        self.errors.push(RecordError {
            key: key.into(),
            reason: reason.to_string(),
        });
    }

    /// One-line summary used for the audit trail.
    pub fn summary(&self) -> String {
        format!(
            "{} inserted, {} updated, {} failed",
            self.inserted, self.updated, self.failed
        )
    }
}

// =============================================================================
// Entity Batch
// =============================================================================

/// Store operations one entity needs for reconciliation.
///
/// Implementations are thin adapters over a `cotar-db` repository; all
/// partitioning and failure-folding lives in [`reconcile`].
#[allow(async_fn_in_trait)] // used generically within the engine, never as dyn
pub trait EntityBatch {
    type Record;

    /// Entity label for logs and the audit trail (e.g. `"states"`).
    fn entity(&self) -> &'static str;

    /// Natural key of one record. Composite keys join their parts with
    /// `"|"` so the key stays a single comparable string.
    fn key(record: &Self::Record) -> String;

    /// All natural keys currently in the local store, fetched once.
    async fn existing_keys(&self) -> DbResult<HashSet<String>>;

    async fn insert(&self, record: &Self::Record) -> DbResult<()>;

    async fn update(&self, record: &Self::Record) -> DbResult<()>;
}

/// Reconciles canonical records against the local store and appends one
/// audit row with the outcome.
pub async fn reconcile<B: EntityBatch>(
    batch: &B,
    records: &[B::Record],
    audit: &SyncLogRepository,
) -> SyncResult<BatchOutcome> {
    let existing = batch.existing_keys().await?;
    let mut outcome = BatchOutcome::default();

    for record in records {
        let key = B::key(record);
        let result = if existing.contains(&key) {
            batch.update(record).await.map(|_| &mut outcome.updated)
        } else {
            batch.insert(record).await.map(|_| &mut outcome.inserted)
        };
        match result {
            Ok(counter) => *counter += 1,
            Err(err) => {
                warn!(
                    entity = batch.entity(),
                    key = %key,
                    error = %err,
                    "Record write failed; continuing batch"
                );
                outcome.record_failure(key, err);
            }
        }
    }

    debug!(
        entity = batch.entity(),
        inserted = outcome.inserted,
        updated = outcome.updated,
        failed = outcome.failed,
        "Batch reconciled"
    );

    audit
        .append(
            batch.entity(),
            SyncRunStatus::Completed,
            &outcome.summary(),
        )
        .await?;

    Ok(outcome)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cotar_db::{Database, DbConfig, DbError};
    use std::sync::Mutex;

    /// In-memory batch over (key, should_fail) pairs.
    struct FakeBatch {
        existing: HashSet<String>,
        writes: Mutex<Vec<String>>,
    }

    impl EntityBatch for FakeBatch {
        type Record = (String, bool);

        fn entity(&self) -> &'static str {
            "fakes"
        }

        fn key(record: &Self::Record) -> String {
            record.0.clone()
        }

        async fn existing_keys(&self) -> DbResult<HashSet<String>> {
            Ok(self.existing.clone())
        }

        async fn insert(&self, record: &Self::Record) -> DbResult<()> {
            if record.1 {
                return Err(DbError::QueryFailed("boom".to_string()));
            }
            self.writes.lock().unwrap().push(format!("ins:{}", record.0));
            Ok(())
        }

        async fn update(&self, record: &Self::Record) -> DbResult<()> {
            if record.1 {
                return Err(DbError::QueryFailed("boom".to_string()));
            }
            self.writes.lock().unwrap().push(format!("upd:{}", record.0));
            Ok(())
        }
    }

    fn rec(key: &str, fail: bool) -> (String, bool) {
        (key.to_string(), fail)
    }

    #[tokio::test]
    async fn test_partitions_inserts_and_updates() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let batch = FakeBatch {
            existing: HashSet::from(["a".to_string()]),
            writes: Mutex::new(Vec::new()),
        };

        let outcome = reconcile(
            &batch,
            &[rec("a", false), rec("b", false)],
            &db.sync_log(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(
            *batch.writes.lock().unwrap(),
            vec!["upd:a".to_string(), "ins:b".to_string()]
        );
    }

    #[tokio::test]
    async fn test_record_failure_does_not_abort_batch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let batch = FakeBatch {
            existing: HashSet::new(),
            writes: Mutex::new(Vec::new()),
        };

        let outcome = reconcile(
            &batch,
            &[rec("a", false), rec("bad", true), rec("c", false)],
            &db.sync_log(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].key, "bad");
    }

    #[tokio::test]
    async fn test_appends_one_audit_row() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let batch = FakeBatch {
            existing: HashSet::new(),
            writes: Mutex::new(Vec::new()),
        };

        reconcile(&batch, &[rec("a", false)], &db.sync_log())
            .await
            .unwrap();

        let rows = db.sync_log().recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].run_type, "fakes");
        assert_eq!(rows[0].message, "1 inserted, 0 updated, 0 failed");
    }
}
