// ============================================================================
// LedgerDb - Embedded Database (redb)
// ============================================================================
// Durable local storage for failed bookings, failed inquiries and UI flags.
// Default path: ~/.cabdesk/ledger.redb (override via CABDESK_LEDGER_PATH env var)
// ============================================================================

pub mod types;

pub use types::{FailedOperationRecord, LedgerKind, LedgerStats};

use anyhow::{anyhow, Result};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Table definitions. Ledger keys are per-table sequence numbers, so key
// order is insertion order.
const FAILED_BOOKINGS: TableDefinition<u64, &[u8]> = TableDefinition::new("failed_bookings");
const FAILED_INQUIRIES: TableDefinition<u64, &[u8]> = TableDefinition::new("failed_inquiries");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
const FLAGS: TableDefinition<&str, bool> = TableDefinition::new("flags");

/// Flag set once the inquiry prompt has been shown
pub const INQUIRY_SHOWN: &str = "inquiry_shown";

fn ledger_table(kind: LedgerKind) -> TableDefinition<'static, u64, &'static [u8]> {
    match kind {
        LedgerKind::Bookings => FAILED_BOOKINGS,
        LedgerKind::Inquiries => FAILED_INQUIRIES,
    }
}

/// Embedded database backing the failed-operation ledgers
pub struct LedgerDb {
    db: Database,
    path: PathBuf,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses CABDESK_LEDGER_PATH env var or ~/.cabdesk/ledger.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("CABDESK_LEDGER_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let cabdesk_dir = home.join(".cabdesk");
            std::fs::create_dir_all(&cabdesk_dir)
                .map_err(|e| anyhow!("Failed to create .cabdesk directory: {}", e))?;
            cabdesk_dir.join("ledger.redb")
        };

        info!("Opening ledger at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open ledger database: {}", e))?;

        // Ensure tables exist so read transactions never hit a missing table
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn.open_table(FAILED_BOOKINGS).map_err(|e| anyhow!("Failed to create failed_bookings table: {}", e))?;
            let _ = write_txn.open_table(FAILED_INQUIRIES).map_err(|e| anyhow!("Failed to create failed_inquiries table: {}", e))?;
            let _ = write_txn.open_table(SEQUENCES).map_err(|e| anyhow!("Failed to create sequences table: {}", e))?;
            let _ = write_txn.open_table(FLAGS).map_err(|e| anyhow!("Failed to create flags table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        debug!("Ledger ready");

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Ledger Operations
    // ========================================================================

    /// Append a record, returning its sequence key
    pub fn append_failed(&self, kind: LedgerKind, record: &FailedOperationRecord) -> Result<u64> {
        let value = serde_json::to_vec(record)
            .map_err(|e| anyhow!("Failed to serialize record: {}", e))?;

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let key;
        {
            let mut sequences = write_txn.open_table(SEQUENCES)
                .map_err(|e| anyhow!("Failed to open sequences table: {}", e))?;
            key = sequences
                .get(kind.as_str())
                .map_err(|e| anyhow!("Failed to read sequence: {}", e))?
                .map(|v| v.value())
                .unwrap_or(0)
                + 1;
            sequences.insert(kind.as_str(), key)
                .map_err(|e| anyhow!("Failed to bump sequence: {}", e))?;

            let mut table = write_txn.open_table(ledger_table(kind))
                .map_err(|e| anyhow!("Failed to open {} ledger: {}", kind.as_str(), e))?;
            table.insert(key, value.as_slice())
                .map_err(|e| anyhow!("Failed to insert record: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Stored failed {} record #{}", kind.as_str(), key);
        Ok(key)
    }

    /// All records of one ledger in insertion order
    pub fn list_failed(&self, kind: LedgerKind) -> Result<Vec<(u64, FailedOperationRecord)>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(ledger_table(kind))
            .map_err(|e| anyhow!("Failed to open {} ledger: {}", kind.as_str(), e))?;

        let mut results = Vec::new();
        let iter = table.range::<u64>(..)
            .map_err(|e| anyhow!("Failed to iterate {} ledger: {}", kind.as_str(), e))?;
        for entry in iter {
            let (key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let record: FailedOperationRecord = serde_json::from_slice(value.value())
                .map_err(|e| anyhow!("Failed to deserialize record #{}: {}", key.value(), e))?;
            results.push((key.value(), record));
        }
        Ok(results)
    }

    /// Remove the given keys; returns how many existed
    pub fn remove_failed(&self, kind: LedgerKind, keys: &[u64]) -> Result<usize> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let mut removed = 0;
        {
            let mut table = write_txn.open_table(ledger_table(kind))
                .map_err(|e| anyhow!("Failed to open {} ledger: {}", kind.as_str(), e))?;
            for key in keys {
                if table.remove(*key)
                    .map_err(|e| anyhow!("Failed to remove record #{}: {}", key, e))?
                    .is_some()
                {
                    removed += 1;
                }
            }
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit delete: {}", e))?;

        if removed > 0 {
            debug!("Removed {} failed {} records", removed, kind.as_str());
        }
        Ok(removed)
    }

    /// Remove `keys` and append `records` in a single transaction.
    /// Either all of it lands or none of it does.
    pub fn replace_failed(
        &self,
        kind: LedgerKind,
        keys: &[u64],
        records: &[FailedOperationRecord],
    ) -> Result<Vec<u64>> {
        let values = records
            .iter()
            .map(|r| serde_json::to_vec(r).map_err(|e| anyhow!("Failed to serialize record: {}", e)))
            .collect::<Result<Vec<_>>>()?;

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let mut new_keys = Vec::with_capacity(values.len());
        {
            let mut table = write_txn.open_table(ledger_table(kind))
                .map_err(|e| anyhow!("Failed to open {} ledger: {}", kind.as_str(), e))?;
            for key in keys {
                table.remove(*key)
                    .map_err(|e| anyhow!("Failed to remove record #{}: {}", key, e))?;
            }

            let mut sequences = write_txn.open_table(SEQUENCES)
                .map_err(|e| anyhow!("Failed to open sequences table: {}", e))?;
            let mut next = sequences
                .get(kind.as_str())
                .map_err(|e| anyhow!("Failed to read sequence: {}", e))?
                .map(|v| v.value())
                .unwrap_or(0);
            for value in &values {
                next += 1;
                table.insert(next, value.as_slice())
                    .map_err(|e| anyhow!("Failed to insert record: {}", e))?;
                new_keys.push(next);
            }
            sequences.insert(kind.as_str(), next)
                .map_err(|e| anyhow!("Failed to bump sequence: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit replace: {}", e))?;

        debug!(
            "Replaced {} failed {} records with {}",
            keys.len(),
            kind.as_str(),
            new_keys.len()
        );
        Ok(new_keys)
    }

    /// Drop every record of one ledger
    pub fn clear_failed(&self, kind: LedgerKind) -> Result<usize> {
        let keys: Vec<u64> = self.list_failed(kind)?.into_iter().map(|(k, _)| k).collect();
        let removed = self.remove_failed(kind, &keys)?;
        info!("Cleared {} failed {} records", removed, kind.as_str());
        Ok(removed)
    }

    // ========================================================================
    // Flag Operations
    // ========================================================================

    pub fn set_flag(&self, name: &str, value: bool) -> Result<()> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn.open_table(FLAGS)
                .map_err(|e| anyhow!("Failed to open flags table: {}", e))?;
            table.insert(name, value)
                .map_err(|e| anyhow!("Failed to set flag: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Flag {} = {}", name, value);
        Ok(())
    }

    pub fn flag(&self, name: &str) -> Result<bool> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(FLAGS)
            .map_err(|e| anyhow!("Failed to open flags table: {}", e))?;

        let value = table.get(name)
            .map_err(|e| anyhow!("Failed to get flag: {}", e))?
            .map(|v| v.value())
            .unwrap_or(false);
        Ok(value)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<LedgerStats> {
        Ok(LedgerStats {
            failed_bookings: self.list_failed(LedgerKind::Bookings)?.len(),
            failed_inquiries: self.list_failed(LedgerKind::Inquiries)?.len(),
            inquiry_shown: self.flag(INQUIRY_SHOWN)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_db() -> (tempfile::TempDir, LedgerDb) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.redb");
        let db = LedgerDb::open(path.to_str()).unwrap();
        (dir, db)
    }

    #[test]
    fn test_append_and_list_in_order() {
        let (_dir, db) = temp_db();
        for i in 0..3 {
            db.append_failed(
                LedgerKind::Bookings,
                &FailedOperationRecord::new(json!({"n": i}), "timeout"),
            )
            .unwrap();
        }

        let records = db.list_failed(LedgerKind::Bookings).unwrap();
        let keys: Vec<u64> = records.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(records[2].1.payload, json!({"n": 2}));
    }

    #[test]
    fn test_sequence_survives_removal() {
        let (_dir, db) = temp_db();
        let record = FailedOperationRecord::new(json!({}), "boom");
        let first = db.append_failed(LedgerKind::Inquiries, &record).unwrap();
        db.clear_failed(LedgerKind::Inquiries).unwrap();
        let second = db.append_failed(LedgerKind::Inquiries, &record).unwrap();
        assert!(second > first, "keys are never reused");
    }

    #[test]
    fn test_kinds_are_separate_tables() {
        let (_dir, db) = temp_db();
        db.append_failed(LedgerKind::Bookings, &FailedOperationRecord::new(json!(1), "a"))
            .unwrap();

        assert!(db.list_failed(LedgerKind::Inquiries).unwrap().is_empty());
        assert_eq!(db.clear_failed(LedgerKind::Inquiries).unwrap(), 0);
        assert_eq!(db.list_failed(LedgerKind::Bookings).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_swaps_records_in_one_step() {
        let (_dir, db) = temp_db();
        let first = db
            .append_failed(LedgerKind::Bookings, &FailedOperationRecord::new(json!({"n": 1}), "offline"))
            .unwrap();
        let second = db
            .append_failed(LedgerKind::Bookings, &FailedOperationRecord::new(json!({"n": 2}), "offline"))
            .unwrap();

        let retried = FailedOperationRecord::new(json!({"n": 2}), "Invalid partner");
        let new_keys = db
            .replace_failed(LedgerKind::Bookings, &[first, second], &[retried])
            .unwrap();
        assert_eq!(new_keys, vec![3]);

        let records = db.list_failed(LedgerKind::Bookings).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, 3);
        assert_eq!(records[0].1.error, "Invalid partner");

        let next = db
            .append_failed(LedgerKind::Bookings, &FailedOperationRecord::new(json!({}), "x"))
            .unwrap();
        assert_eq!(next, 4, "sequence advanced past replaced keys");
    }

    #[test]
    fn test_replace_with_nothing_new_only_removes() {
        let (_dir, db) = temp_db();
        let key = db
            .append_failed(LedgerKind::Inquiries, &FailedOperationRecord::new(json!(1), "a"))
            .unwrap();
        assert!(db.replace_failed(LedgerKind::Inquiries, &[key], &[]).unwrap().is_empty());
        assert!(db.list_failed(LedgerKind::Inquiries).unwrap().is_empty());
    }

    #[test]
    fn test_flags_default_false() {
        let (_dir, db) = temp_db();
        assert!(!db.flag(INQUIRY_SHOWN).unwrap());
        db.set_flag(INQUIRY_SHOWN, true).unwrap();
        assert!(db.stats().unwrap().inquiry_shown);
    }

    #[test]
    fn test_records_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.redb");
        {
            let db = LedgerDb::open(path.to_str()).unwrap();
            db.append_failed(LedgerKind::Bookings, &FailedOperationRecord::new(json!({"a": 1}), "down"))
                .unwrap();
        }
        let db = LedgerDb::open(path.to_str()).unwrap();
        let records = db.list_failed(LedgerKind::Bookings).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.error, "down");
    }
}
