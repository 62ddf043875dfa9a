//! Durable key/value ledger.
//!
//! The source of truth behind the synchronized store: one row per key,
//! unique among live rows, with either hard or soft (tombstone) deletes.
//!
//! # Example
//!
//! ```ignore
//! use kvmirror::services::ledger::{LedgerBackend, LedgerOptions, SqliteLedger};
//!
//! let ledger = SqliteLedger::open("data/skill_action.db", LedgerOptions::default())?;
//! ledger.migrate()?;
//! ledger.set("greeting", "hello")?;
//! assert_eq!(ledger.get("greeting")?.map(|e| e.value), Some("hello".into()));
//! ```
//!
//! # Custom Backends
//!
//! Implement [`LedgerBackend`] to put the synchronized store over another
//! durable engine.

mod backend;
mod sqlite;
mod types;


// Re-export the public API
pub use backend::LedgerBackend;
pub use sqlite::{LedgerOptions, SqliteLedger};
pub use types::{DeletePolicy, Entry, Transition, Upsert};
