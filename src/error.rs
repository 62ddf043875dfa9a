//! Error types for the ledger and synchronized store.
//!
//! "Not found" is never represented here: lookups return `Ok(None)` and
//! deletes return `Ok(false)`. Every variant is a real fault that leaves the
//! memory mirror in its pre-call state.

use std::path::PathBuf;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Store errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A live row already exists for the key.
    ///
    /// The upsert path reconciles live and tombstoned rows before writing,
    /// so seeing this means a row was written around the store.
    #[error("uniqueness constraint violated for key '{key}'")]
    ConstraintViolation {
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Key rejected before reaching the ledger.
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },

    /// Any other failure reported by SQLite.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Ledger file could not be opened.
    #[error("failed to open ledger at {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid key error.
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    /// Classify a SQLite error raised while writing `key`.
    ///
    /// Unique/primary-key failures become [`Error::ConstraintViolation`];
    /// everything else is passed through as [`Error::Storage`].
    pub fn from_write(key: &str, source: rusqlite::Error) -> Self {
        if is_unique_violation(&source) {
            Self::ConstraintViolation {
                key: key.to_string(),
                source,
            }
        } else {
            Self::Storage(source)
        }
    }

    /// Returns true for [`Error::ConstraintViolation`].
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        },
        _ => false,
    }
}

/// Validate a key before it reaches the ledger.
pub(crate) fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_key("key cannot be empty"));
    }
    if key.len() > crate::constants::MAX_KEY_LEN {
        return Err(Error::invalid_key(format!(
            "key is {} bytes, limit is {}",
            key.len(),
            crate::constants::MAX_KEY_LEN
        )));
    }
    Ok(())
}
