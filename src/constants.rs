//! Shared constants for the ledger, mirror and collaborating stores.

/// Environment variable overriding the data directory.
pub const HOME_ENV_VAR: &str = "KVMIRROR_HOME";

/// Data directory used when no override is set (relative to the working directory).
pub const DEFAULT_DATA_DIR: &str = "data";

/// File name of the default ledger database inside the data directory.
pub const DEFAULT_DB_FILE: &str = "skill_action.db";

/// Directory (under the data directory) holding per-plugin config files.
pub const CONFIG_DIR_NAME: &str = "config";

/// Extension used for per-plugin config files.
pub const CONFIG_FILE_EXT: &str = "toml";

/// Ledger table name.
pub const ENTRIES_TABLE: &str = "skill_action_entries";

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 512;

/// How long SQLite waits on a locked database before failing (milliseconds).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Default time-to-live for the expiring store (seconds).
pub const DEFAULT_TIMER_TTL_SECS: u64 = 600;

/// Upper bound on entries held by the expiring store.
pub const DEFAULT_TIMER_MAX_CAPACITY: u64 = 100_000;
