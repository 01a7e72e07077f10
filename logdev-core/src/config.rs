//! Watch configuration.
//!
//! # Layering
//!
//! ```text
//! built-in defaults
//!   <- <home>/.logdev/config.yaml   (or an explicit --config file)
//!     <- command-line overrides
//! ```
//!
//! Each layer is a [`ConfigFile`] whose unset keys leave the previous value
//! alone. As in the rest of the workspace, loaders come in an `_at(home)`
//! form so tests can root them in a `TempDir`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, WatchError};

pub const DEFAULT_WATCH_PATH: &str = "/var/logdev.txt";
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

pub const LOGDEV_DIR: &str = ".logdev";
pub const CONFIG_FILE: &str = "config.yaml";

/// Resolved settings for one watch service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// File to watch.
    pub path: PathBuf,
    /// Minimum spacing between accepted events.
    pub debounce: Duration,
    /// Read budget per accepted event, in bytes.
    pub buffer_capacity: usize,
    /// Perform one extra read after a suppressed burst quiets down.
    pub trailing_edge: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_WATCH_PATH),
            debounce: DEFAULT_DEBOUNCE,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            trailing_edge: false,
        }
    }
}

impl WatchConfig {
    /// Default settings for a given path.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Overlay the keys set in `layer`.
    pub fn apply(mut self, layer: &ConfigFile) -> Self {
        if let Some(path) = &layer.path {
            self.path = path.clone();
        }
        if let Some(ms) = layer.debounce_ms {
            self.debounce = Duration::from_millis(ms);
        }
        if let Some(capacity) = layer.buffer_capacity {
            self.buffer_capacity = capacity;
        }
        if let Some(trailing) = layer.trailing_edge {
            self.trailing_edge = trailing;
        }
        self
    }

    pub fn validate(&self) -> Result<(), WatchError> {
        if self.buffer_capacity == 0 {
            return Err(WatchError::Config(
                "buffer_capacity must be greater than zero".to_string(),
            ));
        }
        if self.path.as_os_str().is_empty() {
            return Err(WatchError::Config("watch path must not be empty".to_string()));
        }
        Ok(())
    }
}

/// On-disk (and command-line) configuration layer. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_capacity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_edge: Option<bool>,
}

/// `<home>/.logdev/`
pub fn logdev_root(home: &Path) -> PathBuf {
    home.join(LOGDEV_DIR)
}

/// `<home>/.logdev/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    logdev_root(home).join(CONFIG_FILE)
}

/// Parse a config layer from an explicit file. The file must exist.
pub fn load_file(path: &Path) -> Result<ConfigFile, WatchError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| WatchError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Defaults overlaid with `<home>/.logdev/config.yaml` when that file exists.
pub fn load_at(home: &Path) -> Result<WatchConfig, WatchError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(WatchConfig::default());
    }
    Ok(WatchConfig::default().apply(&load_file(&path)?))
}

/// `load_at` using `dirs::home_dir()`; falls back to defaults without a home.
pub fn load() -> Result<WatchConfig, WatchError> {
    match dirs::home_dir() {
        Some(home) => load_at(&home),
        None => Ok(WatchConfig::default()),
    }
}
