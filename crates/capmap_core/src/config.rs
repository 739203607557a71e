//! Configuration types for a capability map.

use crate::error::{CapError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name of the configuration inside a map's data directory.
pub const CONFIG_FILE: &str = "capmap.toml";

/// Comprehensive configuration for a capability map.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Tree-related configuration.
    #[serde(default)]
    pub tree: TreeConfig,

    /// Session presence configuration.
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Change feed configuration.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Durable storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a data directory.
    ///
    /// A missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| CapError::ConfigError(format!("failed to read config: {}", e)))?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| CapError::ConfigError(format!("failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to a data directory.
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = root.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)
            .map_err(|e| CapError::ConfigError(format!("failed to serialize config: {}", e)))?;
        fs::write(&path, content)
            .map_err(|e| CapError::ConfigError(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    /// Rejects values the map cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tree.max_name_length == 0 {
            return Err(CapError::ConfigError(
                "tree.max_name_length must be at least 1".to_string(),
            ));
        }
        if self.feed.retention == 0 {
            return Err(CapError::ConfigError(
                "feed.retention must be at least 1".to_string(),
            ));
        }
        if self.storage.database.trim().is_empty() {
            return Err(CapError::ConfigError(
                "storage.database must name a file".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tree-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeConfig {
    /// Maximum capability name length in characters (default: 256).
    pub max_name_length: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_name_length: 256,
        }
    }
}

/// Session presence configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Reject a join whose nickname is already used by a live session (default: false).
    pub unique_nicknames: bool,
}

/// Change feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    /// Number of change events retained for `changes_since` (default: 1024).
    /// Older events are dropped and readers behind the window must resync.
    pub retention: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { retention: 1024 }
    }
}

/// Durable storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// redb database file name inside the data directory (default: capmap.redb).
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: "capmap.redb".to_string(),
        }
    }
}
