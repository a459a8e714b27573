//! Configuration file management.
//!
//! The optional file lives at `<config dir>/bm6/config.toml`. Every key
//! is optional; command-line flags take precedence over it.
//!
//! ```toml
//! format = "json"
//! timeout = 20
//! read_timeout = 0
//! scan_duration = 8
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use bm6_core::SessionConfig;

use crate::cli::{Cli, OutputFormat};

/// Default connection timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default wait for a reading in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Default scan duration in seconds.
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 5;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default output format
    #[serde(default)]
    pub format: Option<OutputFormat>,

    /// Connection timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Reading timeout in seconds (0 = wait indefinitely)
    #[serde(default)]
    pub read_timeout: Option<u64>,

    /// Scan duration in seconds
    #[serde(default)]
    pub scan_duration: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bm6")
            .join("config.toml")
    }

    /// Load config from the default path, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, or return default if missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::read(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config file: {:#}", e);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// Settings after merging flags over the config file over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub format: OutputFormat,
    pub timeout: Duration,
    /// `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
    pub scan_duration: Duration,
}

impl Settings {
    /// Resolve each setting: flag first, then config file, then default.
    pub fn resolve(cli: &Cli, config: &Config) -> Self {
        let timeout = cli.timeout.or(config.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS);
        let read_timeout = cli
            .read_timeout
            .or(config.read_timeout)
            .unwrap_or(DEFAULT_READ_TIMEOUT_SECS);
        let scan_duration = cli
            .scan_duration
            .or(config.scan_duration)
            .unwrap_or(DEFAULT_SCAN_DURATION_SECS);

        Self {
            format: cli.format.or(config.format).unwrap_or_default(),
            timeout: Duration::from_secs(timeout),
            read_timeout: (read_timeout > 0).then(|| Duration::from_secs(read_timeout)),
            scan_duration: Duration::from_secs(scan_duration),
        }
    }

    /// Session timeouts for a read.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .connection_timeout(self.timeout)
            .read_timeout(self.read_timeout)
    }
}
