//! Database configuration.
//!
//! A [`DatabaseConfig`] can be built in code or read from a TOML document:
//!
//! ```toml
//! data_dir = "/var/lib/quill"
//! metadata_file = "metadata.json"
//! lock_timeout_ms = 2000
//! lock_retry_interval_ms = 100
//! stale_lock_after_ms = 300000
//! ```
//!
//! Every key is optional. `stale_lock_after_ms = 0` turns off the
//! reclamation of stale lock markers during acquisition.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quill_core::{Error, Result};
use quill_storage::LockConfig;
use serde::{Deserialize, Serialize};

/// Settings of one database handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Directory holding table files, lock markers and the metadata file.
    pub data_dir: PathBuf,
    /// File name of the metadata descriptor inside `data_dir`.
    pub metadata_file: String,
    pub lock_timeout_ms: u64,
    pub lock_retry_interval_ms: u64,
    /// 0 disables automatic reclamation.
    pub stale_lock_after_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            metadata_file: "metadata.json".to_string(),
            lock_timeout_ms: 2_000,
            lock_retry_interval_ms: 100,
            stale_lock_after_ms: 300_000,
        }
    }
}

impl DatabaseConfig {
    /// Default settings rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file. A relative `data_dir` in it is kept as written,
    /// i.e. relative to the working directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading config {}", path.display()), e))?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.metadata_file.is_empty() {
            return Err(Error::config("metadata_file cannot be empty"));
        }
        if self.lock_retry_interval_ms == 0 {
            return Err(Error::config("lock_retry_interval_ms must be positive"));
        }
        Ok(())
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_metadata_file(mut self, name: impl Into<String>) -> Self {
        self.metadata_file = name.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_stale_lock_after(mut self, max_age: Option<Duration>) -> Self {
        self.stale_lock_after_ms = max_age.map_or(0, |d| d.as_millis() as u64);
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    pub fn stale_lock_after(&self) -> Option<Duration> {
        match self.stale_lock_after_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join(&self.metadata_file)
    }

    /// Lock timing derived from these settings.
    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            timeout: self.lock_timeout(),
            retry_interval: self.lock_retry_interval(),
            stale_after: self.stale_lock_after(),
        }
    }
}
