//! SQLite-backed ledger.
//!
//! One table of entry rows with a unique index over `key` that covers live
//! and tombstoned rows alike. Because a tombstone still owns its key, the
//! upsert path always looks at the existing row first and revives it instead
//! of inserting a second one.

use super::backend::LedgerBackend;
use super::types::{DeletePolicy, Entry, Transition, Upsert};
use crate::constants::{DEFAULT_BUSY_TIMEOUT_MS, ENTRIES_TABLE};
use crate::error::{Error, Result, check_key};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const COLUMNS: &str = "id, key, value, updated_at, deleted_at";

/// Options applied when opening a ledger.
#[derive(Debug, Clone)]
pub struct LedgerOptions {
    /// How `delete` removes rows.
    pub policy: DeletePolicy,
    /// How long to wait on a locked database file.
    pub busy_timeout: Duration,
    /// Reject empty keys and keys longer than 512 bytes on `set`.
    /// Off by default: any string is a valid key.
    pub validate_keys: bool,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            policy: DeletePolicy::default(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            validate_keys: false,
        }
    }
}

/// Ledger stored in a SQLite database.
///
/// # Thread Safety
///
/// The connection sits behind a mutex, so calls from different threads are
/// serialized in this process. Other processes sharing the file are
/// coordinated by SQLite's own locking (`busy_timeout`).
pub struct SqliteLedger {
    conn: Mutex<Connection>,
    policy: DeletePolicy,
    validate_keys: bool,
}

impl SqliteLedger {
    /// Opens or creates a ledger database at `path`.
    ///
    /// Creates parent directories if needed and switches the database to WAL
    /// journaling. Does not create the schema; call
    /// [`LedgerBackend::migrate`] before first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, options: LedgerOptions) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::io(format!("creating ledger directory {}", parent.display()), e)
            })?;
        }

        let conn = Connection::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        // Before the pragma: switching to WAL needs a lock another process may hold.
        conn.busy_timeout(options.busy_timeout)?;
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!(journal_mode = %journal_mode, "Ledger journal mode");

        info!(path = %path.display(), policy = %options.policy, "Opened ledger");
        Self::from_connection(conn, options)
    }

    /// Opens a private in-memory ledger. Data is lost on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn in_memory(options: LedgerOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, options)
    }

    /// Wraps an already-open connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the busy timeout cannot be applied.
    pub fn from_connection(conn: Connection, options: LedgerOptions) -> Result<Self> {
        conn.busy_timeout(options.busy_timeout)?;
        Ok(Self {
            conn: Mutex::new(conn),
            policy: options.policy,
            validate_keys: options.validate_keys,
        })
    }

    /// Runs `f` against the underlying connection for raw queries.
    ///
    /// Writes made here bypass any mirror layered on top of this ledger.
    pub fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> R) -> R {
        let conn = self.conn.lock();
        f(&conn)
    }
}

impl LedgerBackend for SqliteLedger {
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {ENTRIES_TABLE} (
                 id         INTEGER PRIMARY KEY AUTOINCREMENT,
                 key        TEXT NOT NULL,
                 value      TEXT NOT NULL DEFAULT '',
                 updated_at TEXT NOT NULL,
                 deleted_at TEXT
             );
             CREATE UNIQUE INDEX IF NOT EXISTS idx_{ENTRIES_TABLE}_key
                 ON {ENTRIES_TABLE}(key);
             CREATE INDEX IF NOT EXISTS idx_{ENTRIES_TABLE}_deleted_at
                 ON {ENTRIES_TABLE}(deleted_at);"
        ))?;
        info!(table = ENTRIES_TABLE, "Ledger schema ready");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Entry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLUMNS} FROM {ENTRIES_TABLE} WHERE key = ?1 AND deleted_at IS NULL"
        ))?;
        let entry = stmt.query_row(params![key], entry_from_row).optional()?;
        Ok(entry)
    }

    fn set(&self, key: &str, value: &str) -> Result<Upsert> {
        if self.validate_keys {
            check_key(key)?;
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = timestamp(Utc::now());

        // The unique index covers tombstones too, so look at any row for the key.
        let existing: Option<(i64, bool)> = tx
            .query_row(
                &format!("SELECT id, deleted_at IS NULL FROM {ENTRIES_TABLE} WHERE key = ?1"),
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let upsert = match existing {
            Some((id, live)) => Upsert {
                entry: update_row(&tx, id, value, &now)?,
                transition: if live {
                    Transition::Updated
                } else {
                    Transition::Revived
                },
            },
            None => Upsert {
                entry: insert_row(&tx, key, value, &now).map_err(|e| Error::from_write(key, e))?,
                transition: Transition::Inserted,
            },
        };

        tx.commit()?;
        debug!(key = %key, transition = ?upsert.transition, "Ledger set");
        Ok(upsert)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let live: Option<bool> = tx
            .query_row(
                &format!("SELECT deleted_at IS NULL FROM {ENTRIES_TABLE} WHERE key = ?1"),
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match self.policy {
            // Drops a leftover tombstone as well, freeing the key outright.
            DeletePolicy::Hard => {
                tx.execute(
                    &format!("DELETE FROM {ENTRIES_TABLE} WHERE key = ?1"),
                    params![key],
                )?;
            },
            DeletePolicy::Soft => {
                tx.execute(
                    &format!(
                        "UPDATE {ENTRIES_TABLE} SET deleted_at = ?2, updated_at = ?2
                         WHERE key = ?1 AND deleted_at IS NULL"
                    ),
                    params![key, timestamp(Utc::now())],
                )?;
            },
        }

        tx.commit()?;
        let existed = live.unwrap_or(false);
        debug!(key = %key, policy = %self.policy, existed, "Ledger delete");
        Ok(existed)
    }

    fn list(&self) -> Result<Vec<Entry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLUMNS} FROM {ENTRIES_TABLE} WHERE deleted_at IS NULL ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn purge_tombstones(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let purged = conn.execute(
            &format!("DELETE FROM {ENTRIES_TABLE} WHERE deleted_at IS NOT NULL"),
            [],
        )?;
        if purged > 0 {
            info!(purged, "Purged tombstoned rows");
        }
        Ok(purged)
    }

    fn policy(&self) -> DeletePolicy {
        self.policy
    }
}

/// Updates (and un-tombstones) row `id`, returning it as stored.
fn update_row(tx: &Transaction<'_>, id: i64, value: &str, now: &str) -> rusqlite::Result<Entry> {
    tx.query_row(
        &format!(
            "UPDATE {ENTRIES_TABLE} SET value = ?2, updated_at = ?3, deleted_at = NULL
             WHERE id = ?1 RETURNING {COLUMNS}"
        ),
        params![id, value, now],
        entry_from_row,
    )
}

/// Inserts a fresh live row, returning it as stored.
fn insert_row(tx: &Transaction<'_>, key: &str, value: &str, now: &str) -> rusqlite::Result<Entry> {
    tx.query_row(
        &format!(
            "INSERT INTO {ENTRIES_TABLE} (key, value, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, NULL) RETURNING {COLUMNS}"
        ),
        params![key, value, now],
        entry_from_row,
    )
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let updated_at: String = row.get(3)?;
    let deleted_at: Option<String> = row.get(4)?;
    Ok(Entry {
        id: row.get(0)?,
        key: row.get(1)?,
        value: row.get(2)?,
        updated_at: parse_timestamp(3, &updated_at)?,
        deleted_at: deleted_at
            .as_deref()
            .map(|raw| parse_timestamp(4, raw))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(policy: DeletePolicy) -> SqliteLedger {
        let ledger = SqliteLedger::in_memory(LedgerOptions {
            policy,
            ..LedgerOptions::default()
        })
        .unwrap();
        ledger.migrate().unwrap();
        ledger
    }

    fn raw_row_count(ledger: &SqliteLedger, key: &str) -> i64 {
        ledger.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT COUNT(*) FROM {ENTRIES_TABLE} WHERE key = ?1"),
                params![key],
                |row| row.get(0),
            )
            .unwrap()
        })
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let ledger = ledger(DeletePolicy::Hard);
        ledger.migrate().unwrap();
        ledger.migrate().unwrap();
        assert!(ledger.list().unwrap().is_empty());
    }

    #[test]
    fn test_set_transitions() {
        let ledger = ledger(DeletePolicy::Soft);

        let first = ledger.set("k", "v1").unwrap();
        assert_eq!(first.transition, Transition::Inserted);

        let second = ledger.set("k", "v2").unwrap();
        assert_eq!(second.transition, Transition::Updated);
        assert_eq!(second.entry.id, first.entry.id);
        assert_eq!(second.entry.value, "v2");

        assert!(ledger.delete("k").unwrap());
        let third = ledger.set("k", "v3").unwrap();
        assert_eq!(third.transition, Transition::Revived);
        assert_eq!(third.entry.id, first.entry.id);
        assert!(third.entry.is_live());
    }

    #[test]
    fn test_set_returns_committed_row() {
        let ledger = ledger(DeletePolicy::Hard);
        let upsert = ledger.set("k", "v").unwrap();
        assert_eq!(ledger.get("k").unwrap(), Some(upsert.entry));
    }

    #[test]
    fn test_soft_delete_keeps_tombstone() {
        let ledger = ledger(DeletePolicy::Soft);
        ledger.set("k", "v").unwrap();
        assert!(ledger.delete("k").unwrap());

        assert_eq!(ledger.get("k").unwrap(), None);
        assert!(ledger.list().unwrap().is_empty());
        assert_eq!(raw_row_count(&ledger, "k"), 1);

        // Second delete finds no live row.
        assert!(!ledger.delete("k").unwrap());
    }

    #[test]
    fn test_hard_delete_removes_row() {
        let ledger = ledger(DeletePolicy::Hard);
        ledger.set("k", "v").unwrap();
        assert!(ledger.delete("k").unwrap());
        assert_eq!(raw_row_count(&ledger, "k"), 0);
        assert!(!ledger.delete("k").unwrap());
    }

    #[test]
    fn test_hard_delete_clears_leftover_tombstone() {
        let ledger = ledger(DeletePolicy::Hard);
        ledger.set("k", "v").unwrap();
        ledger.with_connection(|conn| {
            conn.execute(
                &format!("UPDATE {ENTRIES_TABLE} SET deleted_at = updated_at WHERE key = 'k'"),
                [],
            )
            .unwrap();
        });

        // A tombstone is not a live row.
        assert!(!ledger.delete("k").unwrap());
        assert_eq!(raw_row_count(&ledger, "k"), 0);
    }

    #[test]
    fn test_purge_tombstones() {
        let ledger = ledger(DeletePolicy::Soft);
        ledger.set("a", "1").unwrap();
        ledger.set("b", "2").unwrap();
        ledger.delete("a").unwrap();

        assert_eq!(ledger.purge_tombstones().unwrap(), 1);
        assert_eq!(raw_row_count(&ledger, "a"), 0);
        assert_eq!(ledger.purge_tombstones().unwrap(), 0);

        // Purged key is free for a plain insert.
        let upsert = ledger.set("a", "3").unwrap();
        assert_eq!(upsert.transition, Transition::Inserted);
    }

    #[test]
    fn test_unmigrated_ledger_errors() {
        let ledger = SqliteLedger::in_memory(LedgerOptions::default()).unwrap();
        assert!(matches!(ledger.get("k"), Err(Error::Storage(_))));
        assert!(matches!(ledger.set("k", "v"), Err(Error::Storage(_))));
    }

    #[test]
    fn test_invalid_key_rejected_when_validating() {
        let ledger = SqliteLedger::in_memory(LedgerOptions {
            validate_keys: true,
            ..LedgerOptions::default()
        })
        .unwrap();
        ledger.migrate().unwrap();

        assert!(matches!(ledger.set("", "v"), Err(Error::InvalidKey { .. })));
        let long = "k".repeat(crate::constants::MAX_KEY_LEN + 1);
        assert!(matches!(ledger.set(&long, "v"), Err(Error::InvalidKey { .. })));
        assert!(ledger.list().unwrap().is_empty());
    }

    #[test]
    fn test_any_key_accepted_by_default() {
        let ledger = ledger(DeletePolicy::Hard);
        let long = "k".repeat(crate::constants::MAX_KEY_LEN + 1);

        assert_eq!(ledger.set("", "empty").unwrap().transition, Transition::Inserted);
        ledger.set(&long, "long").unwrap();

        assert_eq!(ledger.get("").unwrap().unwrap().value, "empty");
        assert_eq!(ledger.get(&long).unwrap().unwrap().value, "long");
    }
}
