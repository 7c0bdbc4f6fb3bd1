//! Configuration file loading and management
//!
//! This module handles loading and parsing the daemon configuration from
//! `$XDG_CONFIG_HOME/wardkeep/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    /// Daemon-specific configuration
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Plugin configuration
    #[serde(default)]
    pub plugins: PluginsConfig,
}

/// Daemon server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StoreConfig {
    /// Path to the SQLite database
    /// If None, uses XDG_DATA_HOME/wardkeep/wardkeep.db
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Capability bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Maximum handler execution time in milliseconds; 0 disables the
    /// watchdog. Default: 5000
    pub handler_deadline_ms: u64,
    /// Per-plugin linear memory ceiling in 64 KiB pages. Default: 16 (1 MiB)
    pub max_memory_pages: u32,
}

/// Plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginsConfig {
    /// Seconds between scheduler passes over tickable plugins; 0 disables
    /// ticking. Default: 30
    pub tick_interval_seconds: u64,
    /// Extra directories to scan for plugin manifests
    #[serde(default)]
    pub extra_dirs: Vec<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            handler_deadline_ms: 5000,
            max_memory_pages: 16,
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 30,
            extra_dirs: Vec::new(),
        }
    }
}

impl Config {
    /// Default configuration file path:
    /// `$XDG_CONFIG_HOME/wardkeep/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "raibid-labs", "wardkeep")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from the default path, writing a default file if
    /// none exists yet.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path().context("could not determine config directory")?;
        if !path.exists() {
            let config = Config::default();
            config.save(&path)?;
            return Ok(config);
        }
        Self::load(&path)
    }

    /// Load configuration from a specific path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path:?}"))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {path:?}"))?;
        Ok(config)
    }

    /// Write configuration to a path, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory: {parent:?}"))?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("failed to write config: {path:?}"))?;
        Ok(())
    }

    /// Handler deadline as a duration, honoring the 0-disables convention.
    pub fn handler_deadline(&self) -> Option<std::time::Duration> {
        match self.bridge.handler_deadline_ms {
            0 => None,
            ms => Some(std::time::Duration::from_millis(ms)),
        }
    }
}
