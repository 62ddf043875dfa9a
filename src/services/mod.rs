//! Storage services.
//!
//! - [`ledger`] - durable SQLite key/value ledger
//! - [`mirror`] - in-memory copy of the ledger's live rows
//! - [`store`] - [`SyncedStore`](store::SyncedStore), read-through/write-through over both
//! - [`expiring`] - TTL store for ephemeral state
//! - [`config_cache`] - per-plugin TOML config files
//!
//! [`Services`] wires them together for a host process.

pub mod config_cache;
pub mod expiring;
pub mod ledger;
pub mod mirror;
pub mod store;

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{error, info};

use crate::config::Config;
use crate::constants::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_TIMER_TTL_SECS};
use crate::error::{Error, Result};
use crate::paths::get_default_db_path;
use expiring::ExpiringStore;
use ledger::{DeletePolicy, LedgerBackend, LedgerOptions, SqliteLedger};
use store::SyncedStore;

/// Options for [`Services::new`].
#[derive(Debug, Clone)]
pub struct ServicesOptions {
    /// Ledger file. `None` uses `<data>/skill_action.db`.
    pub db_path: Option<PathBuf>,
    /// Build the synchronized store on top of the ledger.
    pub enable_db_cache: bool,
    /// TTL for the expiring store. Zero means the default.
    pub timer_ttl: Duration,
    pub delete_policy: DeletePolicy,
    pub busy_timeout: Duration,
    /// Reject empty and over-long keys.
    pub validate_keys: bool,
}

impl Default for ServicesOptions {
    fn default() -> Self {
        Self {
            db_path: None,
            enable_db_cache: true,
            timer_ttl: Duration::from_secs(DEFAULT_TIMER_TTL_SECS),
            delete_policy: DeletePolicy::default(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            validate_keys: false,
        }
    }
}

impl From<&Config> for ServicesOptions {
    fn from(config: &Config) -> Self {
        Self {
            db_path: config.store.db_path.clone(),
            enable_db_cache: config.store.enable_db_cache,
            timer_ttl: config.timer_ttl(),
            delete_policy: config.store.delete_policy,
            busy_timeout: config.busy_timeout(),
            validate_keys: config.store.validate_keys,
        }
    }
}

/// The ledger, the optional synchronized store and the expiring store.
pub struct Services {
    pub db: Arc<SqliteLedger>,
    /// `None` when `enable_db_cache` was off.
    pub cache: Option<SyncedStore>,
    pub timer: ExpiringStore<String, serde_json::Value>,
}

impl Services {
    /// Opens and migrates the ledger, then builds and loads the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the default path cannot be resolved, the ledger
    /// cannot be opened or migrated, or the initial load fails.
    pub fn new(opts: ServicesOptions) -> Result<Self> {
        let db_path = match opts.db_path {
            Some(path) => path,
            None => get_default_db_path().map_err(|e| Error::Config(format!("{e:#}")))?,
        };

        let ledger_opts = LedgerOptions {
            policy: opts.delete_policy,
            busy_timeout: opts.busy_timeout,
            validate_keys: opts.validate_keys,
        };
        let db = Arc::new(SqliteLedger::open(&db_path, ledger_opts)?);
        db.migrate()?;

        let cache = if opts.enable_db_cache {
            let store = SyncedStore::new(db.clone());
            store.load_in_memory()?;
            Some(store)
        } else {
            None
        };

        let ttl = if opts.timer_ttl.is_zero() {
            Duration::from_secs(DEFAULT_TIMER_TTL_SECS)
        } else {
            opts.timer_ttl
        };

        info!(
            path = %db_path.display(),
            cached = cache.is_some(),
            policy = %opts.delete_policy,
            timer_ttl_secs = ttl.as_secs(),
            "Services ready"
        );

        Ok(Self {
            db,
            cache,
            timer: ExpiringStore::new(ttl),
        })
    }
}

static DEFAULT_STORE: OnceLock<Option<SyncedStore>> = OnceLock::new();

/// Process-wide store over the default ledger path.
///
/// Initialized on first call. If opening fails the error is logged and every
/// call returns `None`.
pub fn default_store() -> Option<SyncedStore> {
    DEFAULT_STORE
        .get_or_init(|| match Services::new(ServicesOptions::default()) {
            Ok(services) => services.cache,
            Err(e) => {
                error!(error = %e, "Failed to open default store");
                None
            },
        })
        .clone()
}
