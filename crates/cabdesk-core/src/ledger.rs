//! ============================================================================
//! Failed-Operation Ledger - Durable record of submissions to replay
//! ============================================================================
//! Bookings and inquiries that could not reach the CRM are recorded here with
//! the error that stopped them. An operator lists, exports, clears or replays
//! them. Replays run one entry at a time in insertion order; entries that fail
//! again are re-recorded with the new error.
//! ============================================================================

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::db::{LedgerDb, LedgerKind};
pub use crate::db::FailedOperationRecord;

/// A replayed entry that failed again
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetryFailure {
    pub payload: Value,
    pub error: String,
}

/// Outcome of one `retry_all` pass
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RetrySummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<RetryFailure>,
}

impl RetrySummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// One ledger (bookings or inquiries) over the shared database
#[derive(Clone)]
pub struct Ledger {
    db: Arc<LedgerDb>,
    kind: LedgerKind,
}

impl Ledger {
    pub fn new(db: Arc<LedgerDb>, kind: LedgerKind) -> Self {
        Self { db, kind }
    }

    pub fn kind(&self) -> LedgerKind {
        self.kind
    }

    /// Append an entry. Storage failures are logged and swallowed so the
    /// caller's error path never fails twice.
    pub fn record(&self, payload: Value, error: impl Into<String>) {
        let record = FailedOperationRecord::new(payload, error);
        match self.db.append_failed(self.kind, &record) {
            Ok(key) => info!("Saved failed {} entry #{}: {}", self.kind.as_str(), key, record.error),
            Err(e) => error!("Could not persist failed {} entry: {}", self.kind.as_str(), e),
        }
    }

    pub fn list(&self) -> Result<Vec<FailedOperationRecord>> {
        Ok(self
            .db
            .list_failed(self.kind)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    pub fn clear(&self) -> Result<usize> {
        self.db.clear_failed(self.kind)
    }

    /// Replay every entry present when the pass starts.
    ///
    /// Entries are handed to `retry_fn` one at a time. After the pass the
    /// replayed entries are removed and those that failed again are appended
    /// anew with the fresh error and timestamp, in one transaction. If that
    /// write fails the ledger is unchanged and the whole pass is reported as
    /// an error. Entries recorded while the pass runs are left alone.
    pub async fn retry_all<F, Fut>(&self, mut retry_fn: F) -> Result<RetrySummary>
    where
        F: FnMut(Value) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let entries = self.db.list_failed(self.kind)?;
        if entries.is_empty() {
            info!("No failed {} to retry", self.kind.as_str());
            return Ok(RetrySummary::default());
        }

        info!("Retrying {} failed {}", entries.len(), self.kind.as_str());

        let mut summary = RetrySummary::default();
        let mut replayed = Vec::with_capacity(entries.len());

        for (key, record) in entries {
            summary.attempted += 1;
            replayed.push(key);

            match retry_fn(record.payload.clone()).await {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    warn!("Retry of {} entry #{} failed: {}", self.kind.as_str(), key, e);
                    summary.failures.push(RetryFailure {
                        payload: record.payload,
                        error: e.to_string(),
                    });
                }
            }
        }

        let requeued: Vec<FailedOperationRecord> = summary
            .failures
            .iter()
            .map(|f| FailedOperationRecord::new(f.payload.clone(), f.error.clone()))
            .collect();
        self.db.replace_failed(self.kind, &replayed, &requeued)?;

        info!(
            "Retry of {} finished: {} succeeded, {} failed",
            self.kind.as_str(),
            summary.succeeded,
            summary.failed()
        );
        Ok(summary)
    }
}
