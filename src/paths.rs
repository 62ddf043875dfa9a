//! Path utilities for kvmirror data files.
//!
//! # Base Directory
//! - [`get_data_dir`] - `./data/` unless `KVMIRROR_HOME` is set
//!
//! # Ledger
//! - [`get_default_db_path`] - `<data>/skill_action.db`
//!
//! # Plugin Configuration
//! - [`get_config_dir`] - `<data>/config/<plugin>/`
//! - [`get_config_file_path`] - `<data>/config/<plugin>/<plugin>-<type>.toml`

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_EXT, DEFAULT_DATA_DIR, DEFAULT_DB_FILE, HOME_ENV_VAR,
};

// =============================================================================
// Base Directory
// =============================================================================

/// Get the data directory.
///
/// Resolution order:
/// 1. `KVMIRROR_HOME` environment variable (if set and non-empty)
/// 2. `./data/` (default, relative to the working directory)
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV_VAR)
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    Ok(PathBuf::from(DEFAULT_DATA_DIR))
}

/// Get the default ledger path: `<data>/skill_action.db`
pub fn get_default_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(DEFAULT_DB_FILE))
}

// =============================================================================
// Plugin Configuration
// =============================================================================

/// Config directory for a plugin: `<data_dir>/config/<plugin>`
pub fn get_config_dir(data_dir: &Path, plugin_name: &str) -> PathBuf {
    data_dir.join(CONFIG_DIR_NAME).join(plugin_name)
}

/// Config file for a plugin and config type:
/// `<data_dir>/config/<plugin>/<plugin>-<type>.toml`
pub fn get_config_file_path(data_dir: &Path, plugin_name: &str, type_name: &str) -> PathBuf {
    get_config_dir(data_dir, plugin_name)
        .join(format!("{plugin_name}-{type_name}.{CONFIG_FILE_EXT}"))
}
