//! kvmirror: a SQLite ledger with a write-through in-memory mirror.
//!
//! The entry point is [`services::store::SyncedStore`]; [`services::Services`]
//! wires it up from a [`config::Config`] together with the expiring store.

pub mod config;
pub mod constants;
pub mod error;
pub mod paths;
pub mod services;

pub use error::{Error, Result};
pub use services::ledger::{DeletePolicy, Entry};
pub use services::store::SyncedStore;
pub use services::{Services, ServicesOptions, default_store};
