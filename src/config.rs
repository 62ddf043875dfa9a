//! Configuration types for kvmirror.
//!
//! Settings are loaded from a TOML file with two sections:
//!
//! - [`StoreConfig`] - ledger location, delete policy and mirror toggle
//! - [`TimerConfig`] - expiring store TTL
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::services::ledger::DeletePolicy;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// kvmirror.toml configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub timer: TimerConfig,
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Ledger file. Defaults to `<data>/skill_action.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub delete_policy: DeletePolicy,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Build the synchronized store on top of the ledger.
    #[serde(default = "default_true")]
    pub enable_db_cache: bool,
    /// Reject empty keys and keys over 512 bytes.
    #[serde(default)]
    pub validate_keys: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            delete_policy: DeletePolicy::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_db_cache: true,
            validate_keys: false,
        }
    }
}

/// `[timer]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Zero falls back to the default TTL.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    constants::DEFAULT_BUSY_TIMEOUT_MS
}

fn default_ttl_secs() -> u64 {
    constants::DEFAULT_TIMER_TTL_SECS
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - A field has an invalid type or value (e.g. unknown delete policy)
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Like [`Config::load_from`], but a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    /// Busy timeout as a `Duration`.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.store.busy_timeout_ms)
    }

    /// Timer TTL as a `Duration`, with zero mapped to the default.
    pub fn timer_ttl(&self) -> Duration {
        match self.timer.ttl_secs {
            0 => Duration::from_secs(constants::DEFAULT_TIMER_TTL_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails with one or more errors:
    /// - `busy_timeout_ms` is zero
    /// - `db_path` is empty or points at a directory
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.store.busy_timeout_ms == 0 {
            errors.push(
                "store.busy_timeout_ms cannot be 0\n  \
                 Concurrent writers would fail immediately with SQLITE_BUSY (default: 5000)"
                    .to_string(),
            );
        }

        if let Some(db_path) = &self.store.db_path {
            if db_path.as_os_str().is_empty() {
                errors.push("store.db_path cannot be empty".to_string());
            } else if db_path.is_dir() {
                errors.push(format!(
                    "store.db_path is a directory: {}\n  \
                     Expected a SQLite database file path",
                    db_path.display()
                ));
            }
        }

        if self.store.delete_policy == DeletePolicy::Soft {
            warnings.push(
                "store.delete_policy = \"soft\" keeps tombstones on disk\n  \
                 Run `kvmirror purge` periodically to reclaim space"
                    .to_string(),
            );
        }

        if !self.store.enable_db_cache {
            warnings.push(
                "store.enable_db_cache = false: the ledger opens without the memory mirror"
                    .to_string(),
            );
        }

        if self.timer.ttl_secs == 0 {
            warnings.push(format!(
                "timer.ttl_secs = 0 falls back to the default ({}s)",
                constants::DEFAULT_TIMER_TTL_SECS
            ));
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
