//! File-backed plugin configuration.
//!
//! Each plugin keeps its settings in TOML files laid out as
//! `<data_dir>/config/<plugin>/<plugin>-<type>.toml`. A [`ConfigCache`] owns
//! the lock that keeps concurrent loads and saves of those files apart; hand
//! the same instance to every caller that touches the same files.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::paths::{get_config_dir, get_config_file_path};

/// Host/bot metadata persisted as the `engine` config type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMeta {
    #[serde(default)]
    pub bot_id: String,
    #[serde(default)]
    pub bot_name: String,
    #[serde(default)]
    pub bot_type: String,
    #[serde(default)]
    pub bot_config_path: String,
    #[serde(default)]
    pub bot_super_admin_list: Vec<String>,
}

/// Plugin metadata. Plugins usually declare one as a constant-like value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMeta {
    #[serde(default)]
    pub plugin_id: String,
    #[serde(default)]
    pub plugin_name: String,
    #[serde(default)]
    pub plugin_type: String,
    #[serde(default)]
    pub plugin_is_default_on: bool,
}

impl PluginMeta {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        plugin_type: impl Into<String>,
        is_default_on: bool,
    ) -> Self {
        Self {
            plugin_id: id.into(),
            plugin_name: name.into(),
            plugin_type: plugin_type.into(),
            plugin_is_default_on: is_default_on,
        }
    }
}

/// Resolves config file paths for one plugin.
#[derive(Debug, Clone)]
pub struct PluginPaths {
    pub data_dir: PathBuf,
    pub plugin: PluginMeta,
}

impl PluginPaths {
    pub fn new(data_dir: impl Into<PathBuf>, plugin: PluginMeta) -> Self {
        Self {
            data_dir: data_dir.into(),
            plugin,
        }
    }

    /// Builds paths from a loaded engine record, using its `bot_config_path`
    /// as the data directory.
    pub fn from_engine(engine: &EngineMeta, plugin: PluginMeta) -> Self {
        Self::new(&engine.bot_config_path, plugin)
    }

    /// Directory holding this plugin's config files.
    pub fn dir(&self) -> PathBuf {
        get_config_dir(&self.data_dir, &self.plugin.plugin_name)
    }

    /// Path of the config file for `type_name` (e.g. `"engine"`).
    pub fn path(&self, type_name: &str) -> PathBuf {
        get_config_file_path(&self.data_dir, &self.plugin.plugin_name, type_name)
    }
}

/// Serializes access to config files.
#[derive(Debug, Default)]
pub struct ConfigCache {
    lock: RwLock<()>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and parses the file at `path`.
    ///
    /// Returns `Ok(None)` if the file does not exist or is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for `T`.
    pub fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        let _guard = self.lock.read();

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read config file: {}", path.display()));
            },
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(Some(value))
    }

    /// Writes `value` to `path`, creating parent directories as needed.
    ///
    /// The file is replaced atomically through a temp file in the same
    /// directory, so readers never see a half-written config.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn save<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let _guard = self.lock.write();

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let content = toml::to_string_pretty(value).context("Failed to serialize config")?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(content.as_bytes())
            .context("Failed to write config temp file")?;
        tmp.persist(path)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Reports whether a config file exists at `path`.
    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Writes `initial` only if no file exists yet. Returns true if written.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn init<T: Serialize>(&self, path: &Path, initial: &T) -> Result<bool> {
        if self.exists(path) {
            return Ok(false);
        }
        self.save(path, initial)?;
        Ok(true)
    }
}
