//! SQLite persistence of the lease registry
//!
//! Records and journal entries are stored as JSON documents next to a few
//! indexed columns. Saving replaces the active records and brings the journal
//! table up to date incrementally: rows popped by a rollback are deleted and
//! entries pushed since the last save are appended. Loading rebuilds the
//! in-memory indices from the stored records.

use std::path::Path;

use rusqlite::{params, Connection};
#[cfg(feature = "tracing")]
use tracing::debug;

use crate::errors::StorageError;
use crate::registry::{JournalEntry, LeaseRecord, LeaseRegistry, TransitionJournal};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS registry_meta (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS lease_records (
        outpoint TEXT PRIMARY KEY,
        value INTEGER NOT NULL,
        pattern TEXT NOT NULL,
        state TEXT NOT NULL,
        confirmed_height INTEGER NOT NULL,
        maturity_height INTEGER NOT NULL,
        last_reward_height INTEGER NOT NULL,
        record_json TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS lease_journal (
        seq INTEGER PRIMARY KEY,
        height INTEGER NOT NULL,
        outpoint TEXT NOT NULL,
        entry_json TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_lease_journal_height ON lease_journal(height);
    CREATE INDEX IF NOT EXISTS idx_lease_records_state ON lease_records(state);
"#;

fn to_sql_int(value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::Corrupt(format!("{value} exceeds SQLite integer range")))
}

fn from_sql_int(value: i64) -> Result<u64, StorageError> {
    u64::try_from(value).map_err(|_| StorageError::Corrupt(format!("negative stored value {value}")))
}

pub struct SqliteLeaseStore {
    connection: Connection,
}

impl SqliteLeaseStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let connection = Connection::open(path)?;
        Self::with_connection(connection)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let connection = Connection::open_in_memory()?;
        Self::with_connection(connection)
    }

    fn with_connection(connection: Connection) -> Result<Self, StorageError> {
        connection.execute_batch(SCHEMA)?;
        Ok(Self { connection })
    }

    /// Store `registry`, which must be the registry last saved here or one
    /// derived from it. Any other registry replaces the journal wholesale.
    pub fn save_registry(&mut self, registry: &LeaseRegistry) -> Result<(), StorageError> {
        let journal = registry.journal();
        let stored_next_seq = self.meta("journal_next_seq")?;
        let stored_max_seq: Option<i64> =
            self.connection
                .query_row("SELECT MAX(seq) FROM lease_journal", [], |row| row.get(0))?;
        let stored_max_seq = stored_max_seq.map(from_sql_int).transpose()?;
        let descendant = stored_next_seq.map_or(true, |next| journal.next_seq() >= next);
        let last_kept = match stored_max_seq {
            Some(max) if descendant => journal
                .entries()
                .iter()
                .rev()
                .map(|e| e.seq)
                .find(|seq| *seq <= max),
            _ => None,
        };
        let appended = match (stored_max_seq, descendant) {
            (Some(max), true) => journal.entries_after(Some(max)),
            _ => journal.entries_after(None),
        };

        let tx = self.connection.transaction()?;
        tx.execute("DELETE FROM lease_records", [])?;
        let _removed = match last_kept {
            Some(seq) => tx.execute("DELETE FROM lease_journal WHERE seq > ?1", params![to_sql_int(seq)?])?,
            None => tx.execute("DELETE FROM lease_journal", [])?,
        };
        tx.execute(
            "INSERT OR REPLACE INTO registry_meta (key, value)
             VALUES ('maturity', ?1), ('tip', ?2), ('journal_next_seq', ?3)",
            params![
                to_sql_int(registry.maturity())?,
                to_sql_int(registry.tip())?,
                to_sql_int(journal.next_seq())?
            ],
        )?;

        {
            let mut insert_record = tx.prepare(
                "INSERT INTO lease_records (outpoint, value, pattern, state, confirmed_height,
                     maturity_height, last_reward_height, record_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for record in registry.records() {
                insert_record.execute(params![
                    record.outpoint.to_string(),
                    to_sql_int(record.value.as_u64())?,
                    record.pattern().to_string(),
                    record.state.to_string(),
                    to_sql_int(record.confirmed_height)?,
                    to_sql_int(record.maturity_height)?,
                    to_sql_int(record.last_reward_height)?,
                    serde_json::to_string(record)?,
                ])?;
            }

            let mut insert_entry = tx.prepare(
                "INSERT INTO lease_journal (seq, height, outpoint, entry_json) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in appended {
                insert_entry.execute(params![
                    to_sql_int(entry.seq)?,
                    to_sql_int(entry.height)?,
                    entry.transition.outpoint().to_string(),
                    serde_json::to_string(entry)?,
                ])?;
            }
        }
        tx.commit()?;

        #[cfg(feature = "tracing")]
        debug!(
            records = registry.len(),
            journal_removed = _removed,
            journal_appended = appended.len(),
            tip = registry.tip(),
            "Saved lease registry"
        );
        Ok(())
    }

    fn meta(&self, key: &str) -> Result<Option<u64>, StorageError> {
        let mut stmt = self
            .connection
            .prepare("SELECT value FROM registry_meta WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get::<_, i64>(0))?;
        match rows.next() {
            Some(value) => Ok(Some(from_sql_int(value?)?)),
            None => Ok(None),
        }
    }

    /// Load the stored registry; `None` when nothing was saved yet
    pub fn load_registry(&self) -> Result<Option<LeaseRegistry>, StorageError> {
        let Some(maturity) = self.meta("maturity")? else {
            return Ok(None);
        };
        let tip = self.meta("tip")?.unwrap_or(0);

        let mut stmt = self
            .connection
            .prepare("SELECT record_json FROM lease_records ORDER BY confirmed_height, outpoint")?;
        let records = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|json| Ok(serde_json::from_str::<LeaseRecord>(&json?)?))
            .collect::<Result<Vec<_>, StorageError>>()?;

        let mut stmt = self
            .connection
            .prepare("SELECT entry_json FROM lease_journal ORDER BY seq")?;
        let entries = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|json| Ok(serde_json::from_str::<JournalEntry>(&json?)?))
            .collect::<Result<Vec<_>, StorageError>>()?;

        let next_seq = match self.meta("journal_next_seq")? {
            Some(next_seq) => next_seq,
            None => entries.last().map_or(0, |e| e.seq + 1),
        };
        let journal = TransitionJournal::from_entries(entries, next_seq)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let registry = LeaseRegistry::from_parts(maturity, tip, records, journal)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(Some(registry))
    }

    pub fn journal_len(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM lease_journal", [], |row| row.get(0))?;
        Ok(from_sql_int(count)? as usize)
    }

    pub fn record_count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM lease_records", [], |row| row.get(0))?;
        Ok(from_sql_int(count)? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::types::{Amount, KeyHash, OutPoint, TxId};
    use crate::validation::ClassifiedScript;

    fn registry() -> LeaseRegistry {
        let lease = ClassifiedScript::Lease {
            owner: KeyHash([1u8; 20]),
            leaser: KeyHash([2u8; 20]),
        };
        let mut registry = LeaseRegistry::new(3);
        registry
            .on_confirmed(OutPoint::new(TxId([1u8; 32]), 0), Amount(100), &lease, 1)
            .unwrap();
        registry
            .on_confirmed(OutPoint::new(TxId([2u8; 32]), 1), Amount(200), &lease, 2)
            .unwrap();
        registry.on_height_advance(4).unwrap();
        registry
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let store = SqliteLeaseStore::open_in_memory().unwrap();
        assert!(store.load_registry().unwrap().is_none());
        assert_eq!(store.journal_len().unwrap(), 0);
    }

    #[test]
    fn test_save_and_load() {
        let mut store = SqliteLeaseStore::open_in_memory().unwrap();
        let original = registry();
        store.save_registry(&original).unwrap();
        assert_eq!(store.record_count().unwrap(), 2);
        assert_eq!(store.journal_len().unwrap(), original.journal().len());

        let loaded = store.load_registry().unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_save_replaces_previous_state() {
        let mut store = SqliteLeaseStore::open_in_memory().unwrap();
        let mut registry = registry();
        store.save_registry(&registry).unwrap();
        registry.rollback_to(2).unwrap();
        store.save_registry(&registry).unwrap();
        assert_eq!(store.record_count().unwrap(), 1);
        assert_eq!(store.load_registry().unwrap().unwrap(), registry);
    }

    #[test]
    fn test_journal_is_saved_incrementally() {
        let mut store = SqliteLeaseStore::open_in_memory().unwrap();
        let mut registry = registry();
        store.save_registry(&registry).unwrap();
        let saved = registry.journal().len();

        // Rolled back entries are removed, replayed ones appended after them
        registry.rollback_to(2).unwrap();
        let lease = ClassifiedScript::Lease {
            owner: KeyHash([3u8; 20]),
            leaser: KeyHash([2u8; 20]),
        };
        registry
            .on_confirmed(OutPoint::new(TxId([3u8; 32]), 0), Amount(300), &lease, 2)
            .unwrap();
        registry.on_height_advance(5).unwrap();
        store.save_registry(&registry).unwrap();
        assert_eq!(store.journal_len().unwrap(), registry.journal().len());
        assert!(registry.journal().next_seq() as usize > saved);

        let loaded = store.load_registry().unwrap().unwrap();
        assert_eq!(loaded, registry);
        assert_eq!(loaded.journal().next_seq(), registry.journal().next_seq());

        // Saving again with nothing new leaves the journal unchanged
        store.save_registry(&loaded).unwrap();
        assert_eq!(store.load_registry().unwrap().unwrap(), registry);
    }

    #[test]
    fn test_unrelated_registry_replaces_journal() {
        let mut store = SqliteLeaseStore::open_in_memory().unwrap();
        let mut long = registry();
        long.on_height_advance(6).unwrap();
        long.rollback_to(2).unwrap();
        long.on_height_advance(4).unwrap();
        store.save_registry(&long).unwrap();

        let fresh = LeaseRegistry::new(3);
        store.save_registry(&fresh).unwrap();
        assert_eq!(store.journal_len().unwrap(), 0);
        assert_eq!(store.load_registry().unwrap().unwrap(), fresh);
    }
}
