//! `SyncedStore`: the ledger and the memory mirror behind one API.
//!
//! Reads hit the mirror and fall through to the ledger on a miss. Writes and
//! deletes commit to the ledger first and only then touch the mirror, so the
//! mirror never shows anything that is not durable.

use crate::error::Result;
use crate::services::ledger::{DeletePolicy, Entry, LedgerBackend, LedgerOptions, SqliteLedger};
use crate::services::mirror::MemoryMirror;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Internal shared state for the synchronized store.
pub(crate) struct SyncedStoreInner {
    pub(crate) ledger: Arc<dyn LedgerBackend>,
    pub(crate) mirror: MemoryMirror,
    /// Held across "ledger call, then mirror update" for every path that
    /// changes the mirror. Mirror hits never take it.
    sequencer: Mutex<()>,
    loaded: AtomicBool,
}

/// Read-through, write-through key/value store.
///
/// # Thread Safety
///
/// `SyncedStore` is `Clone` (an `Arc` handle) and can be shared across
/// request threads. Mirror reads proceed in parallel. Mutations and mirror
/// misses are sequenced so the mirror always ends up holding the row the
/// ledger committed last for each key.
///
/// # Example
///
/// ```ignore
/// use kvmirror::services::store::SyncedStore;
///
/// let store = SyncedStore::open("data/skill_action.db", Default::default())?;
/// store.set("greeting", "hello")?;
/// assert_eq!(store.get("greeting")?, Some("hello".to_string()));
/// ```
#[derive(Clone)]
pub struct SyncedStore {
    pub(crate) inner: Arc<SyncedStoreInner>,
}

impl SyncedStore {
    /// Wraps an already-migrated ledger with an empty mirror.
    ///
    /// Call [`SyncedStore::load_in_memory`] before serving traffic; until
    /// then every first read of a key goes to the ledger.
    pub fn new(ledger: Arc<dyn LedgerBackend>) -> Self {
        Self {
            inner: Arc::new(SyncedStoreInner {
                ledger,
                mirror: MemoryMirror::new(),
                sequencer: Mutex::new(()),
                loaded: AtomicBool::new(false),
            }),
        }
    }

    /// Wraps a concrete ledger backend.
    pub fn with_backend<B: LedgerBackend>(backend: B) -> Self {
        Self::new(Arc::new(backend))
    }

    /// Opens a SQLite ledger at `path`, migrates it and loads the mirror.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened, the schema cannot
    /// be created, or the initial load fails.
    pub fn open<P: AsRef<Path>>(path: P, options: LedgerOptions) -> Result<Self> {
        let ledger = SqliteLedger::open(path, options)?;
        ledger.migrate()?;
        let store = Self::with_backend(ledger);
        store.load_in_memory()?;
        Ok(store)
    }

    /// Creates a store over a fresh in-memory SQLite ledger.
    ///
    /// Ideal for tests and embedding. All data is lost on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn in_memory(options: LedgerOptions) -> Result<Self> {
        let ledger = SqliteLedger::in_memory(options)?;
        ledger.migrate()?;
        let store = Self::with_backend(ledger);
        store.load_in_memory()?;
        Ok(store)
    }

    /// Replaces the mirror with the ledger's current live set.
    ///
    /// # Errors
    ///
    /// Returns an error if listing the ledger fails; the mirror keeps its
    /// previous contents.
    pub fn load_in_memory(&self) -> Result<()> {
        let _seq = self.inner.sequencer.lock();
        let rows = self.inner.ledger.list()?;
        let count = rows.len();
        self.inner.mirror.load(rows);
        self.inner.loaded.store(true, Ordering::Release);
        info!(entries = count, "Loaded ledger into memory");
        Ok(())
    }

    /// Returns the value for `key`, or `Ok(None)` if no live row exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the key missed the mirror and the ledger lookup
    /// failed.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_entry(key)?.map(|entry| entry.value))
    }

    /// Returns the full row for `key` with the same read-through rules as
    /// [`SyncedStore::get`].
    ///
    /// Misses are not cached, so a later `set` is visible immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger lookup failed.
    pub fn get_entry(&self, key: &str) -> Result<Option<Entry>> {
        if let Some(entry) = self.inner.mirror.get(key) {
            return Ok(Some(entry));
        }

        let _seq = self.inner.sequencer.lock();

        // A writer may have filled the slot while we waited.
        if let Some(entry) = self.inner.mirror.get(key) {
            return Ok(Some(entry));
        }

        match self.inner.ledger.get(key)? {
            Some(entry) => {
                debug!(key = %key, "Backfilled mirror from ledger");
                self.inner.mirror.set(entry.clone());
                Ok(Some(entry))
            },
            None => Ok(None),
        }
    }

    /// Upserts `key` in the ledger, then mirrors the committed row.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger write fails; the mirror is untouched.
    pub fn set(&self, key: &str, value: &str) -> Result<Entry> {
        let _seq = self.inner.sequencer.lock();
        let upsert = self.inner.ledger.set(key, value)?;
        self.inner.mirror.set(upsert.entry.clone());
        debug!(key = %key, transition = ?upsert.transition, "Write-through set");
        Ok(upsert.entry)
    }

    /// Deletes `key` from the ledger, then from the mirror.
    ///
    /// Returns `Ok(true)` if a live row existed, `Ok(false)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger delete fails; the mirror is untouched.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let _seq = self.inner.sequencer.lock();
        let existed = self.inner.ledger.delete(key)?;
        self.inner.mirror.delete(key);
        debug!(key = %key, existed, "Write-through delete");
        Ok(existed)
    }

    /// Snapshot of the mirror, in no particular order.
    ///
    /// Use [`SyncedStore::get`] when a single key must be authoritative.
    pub fn list(&self) -> Vec<Entry> {
        self.inner.mirror.list()
    }

    /// Mirror-only lookup; never consults the ledger.
    pub fn get_by_key(&self, key: &str) -> Option<Entry> {
        self.inner.mirror.get(key)
    }

    /// Physically removes tombstoned ledger rows.
    ///
    /// Tombstones are never mirrored, so the mirror is unaffected.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger purge fails.
    pub fn purge_tombstones(&self) -> Result<usize> {
        self.inner.ledger.purge_tombstones()
    }

    /// Returns true once [`SyncedStore::load_in_memory`] has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.load(Ordering::Acquire)
    }

    /// Number of mirrored rows.
    pub fn len(&self) -> usize {
        self.inner.mirror.len()
    }

    /// Returns true if the mirror holds no rows.
    pub fn is_empty(&self) -> bool {
        self.inner.mirror.is_empty()
    }

    /// Delete policy of the underlying ledger.
    pub fn delete_policy(&self) -> DeletePolicy {
        self.inner.ledger.policy()
    }

    /// The underlying ledger. Writes made through it bypass the mirror.
    pub fn ledger(&self) -> &Arc<dyn LedgerBackend> {
        &self.inner.ledger
    }
}
