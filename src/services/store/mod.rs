//! Synchronized dual-layer store.
//!
//! Composes the durable [`ledger`](super::ledger) with the in-process
//! [`mirror`](super::mirror):
//!
//! - **Read-through**: `get` checks the mirror, falls back to the ledger on
//!   a miss and backfills the mirror with what it found.
//! - **Write-through**: `set`/`delete` commit to the ledger first; the mirror
//!   only changes after the ledger call succeeded.
//! - **Bulk load**: `load_in_memory` seeds the mirror at startup.
//!
//! # Example
//!
//! ```ignore
//! use kvmirror::services::store::SyncedStore;
//! use kvmirror::services::ledger::LedgerOptions;
//!
//! let store = SyncedStore::in_memory(LedgerOptions::default())?;
//! store.set("a", "1")?;
//! store.delete("a")?;
//! store.set("a", "2")?;
//! assert_eq!(store.get("a")?, Some("2".to_string()));
//! ```

#[allow(clippy::module_inception)]
mod store;


pub use store::SyncedStore;
