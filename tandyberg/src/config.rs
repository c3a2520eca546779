//! The persisted config document and where it lives.
//!
//! The document records the last bound interface and the preset table:
//!
//! ```json
//! {
//!   "interface": "/dev/ttyUSB0",
//!   "presets": { "3": [-1200, 340, 16383, 4660] }
//! }
//! ```
//!
//! A missing or malformed file loads as the empty default. A malformed file
//! is left in place so it can be inspected; the next save overwrites it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::presets::PresetStore;
use crate::transport::InterfaceId;

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Errors from reading or writing the config document.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but is not a valid config document
    #[error("Config file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem failure
    #[error("Config I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for config storage.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Everything the controller remembers between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Interface of the last successful binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<InterfaceId>,
    /// Stored presets
    #[serde(default)]
    pub presets: PresetStore,
}

/// Loads and saves the [`Config`] document.
pub trait ConfigStore: Send + Sync {
    /// Load the document. Never fails: problems yield the empty default.
    fn load(&self) -> Config;

    /// Replace the stored document with `config`.
    fn save(&self, config: &Config) -> ConfigResult<()>;
}

// ==================== JSON file ====================

/// Stores the config as pretty-printed JSON in one file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file strictly.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn read(&self) -> ConfigResult<Option<Config>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| ConfigError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_FILE)
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Config {
        match self.read() {
            Ok(Some(config)) => {
                debug!(
                    "Loaded config from {} ({} presets)",
                    self.path.display(),
                    config.presets.len()
                );
                config
            }
            Ok(None) => {
                debug!("No config at {}, using defaults", self.path.display());
                Config::default()
            }
            Err(e) => {
                warn!("{e}; using defaults");
                Config::default()
            }
        }
    }

    fn save(&self, config: &Config) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(config).map_err(io::Error::other)?;
        let temp = self.temp_path();
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;
        debug!("Saved config to {}", self.path.display());
        Ok(())
    }
}

// ==================== In memory ====================

#[derive(Debug, Default)]
struct MemoryInner {
    config: Mutex<Config>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

/// Keeps the config in memory. Clones share the same document.
///
/// Used by tests and by the CLI's dry-run mode.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    /// Empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from `config`.
    pub fn with_config(config: Config) -> Self {
        let store = Self::new();
        *store.lock() = config;
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Config> {
        self.inner.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Last document saved (or the initial one).
    pub fn current(&self) -> Config {
        self.lock().clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// Make every save fail until turned off again.
    pub fn set_fail_saves(&self, fail: bool) {
        self.inner.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Config {
        self.current()
    }

    fn save(&self, config: &Config) -> ConfigResult<()> {
        if self.inner.fail_saves.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "save disabled").into());
        }
        *self.lock() = config.clone();
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
