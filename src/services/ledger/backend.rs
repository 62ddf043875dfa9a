//! Backend trait for the ledger.
//!
//! Defines the interface the synchronized store drives, so the durable layer
//! can be swapped (SQLite file, SQLite in memory, fault-injecting wrappers in
//! tests).

use super::types::{DeletePolicy, Entry, Upsert};
use crate::error::Result;

/// Durable storage of entry rows with key uniqueness among live rows.
///
/// All backends must be thread-safe (`Send + Sync`); the synchronized store
/// calls them from many request threads at once. Every method is blocking.
pub trait LedgerBackend: Send + Sync + 'static {
    /// Creates the schema. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema statements fail.
    fn migrate(&self) -> Result<()>;

    /// Looks up the live row for `key`.
    ///
    /// Returns `Ok(None)` if no live row exists; tombstoned rows are never
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    fn get(&self, key: &str) -> Result<Option<Entry>>;

    /// Upserts `key`.
    ///
    /// Updates a live row in place, revives a tombstoned row, or inserts a
    /// new one. The returned entry is the row as committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails. On error
    /// nothing was committed.
    fn set(&self, key: &str, value: &str) -> Result<Upsert>;

    /// Removes `key` from the live set according to [`LedgerBackend::policy`].
    ///
    /// Returns `Ok(true)` if a live row existed, `Ok(false)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Returns all live rows in storage order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    fn list(&self) -> Result<Vec<Entry>>;

    /// Physically removes tombstoned rows, returning how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    fn purge_tombstones(&self) -> Result<usize>;

    /// Delete policy this backend applies.
    fn policy(&self) -> DeletePolicy;
}
