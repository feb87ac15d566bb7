//! Configuration module for the topic tree engine
//!
//! This module handles engine configuration:
//! - Merge cadence and idle deferral of the live tree
//! - Change buffer capacity policy
//! - Per-topic history depth
//! - The preprocessor selected at tree construction
//!
//! # Config Location
//!
//! The default config file lives in the platform config directory:
//! - **Linux**: `~/.config/topic-tree/engine.toml`
//! - **macOS**: `~/Library/Application Support/topic-tree/engine.toml`
//! - **Windows**: `%APPDATA%\topic-tree\engine.toml`
//!
//! # Example
//!
//! ```toml
//! preprocessor = "NamespaceExpanding"
//!
//! [merge]
//! interval_ms = 300
//! defer_to_idle = true
//! idle_timeout_ms = 500
//!
//! [buffer]
//! max_messages = 100000
//!
//! [tree]
//! history_capacity = 20
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, TopicTreeError};
use crate::pipeline::preprocessor::PreprocessorKind;
use crate::pipeline::topic_tree::DEFAULT_HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "topic-tree";

/// Config filename
pub const CONFIG_FILE: &str = "engine.toml";

/// Default merge cadence in milliseconds
pub const DEFAULT_MERGE_INTERVAL_MS: u64 = 300;

/// Default upper bound for an idle-deferred merge in milliseconds
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 500;

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Preprocessor installed on new trees
    #[serde(default)]
    pub preprocessor: PreprocessorKind,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub buffer: BufferConfig,

    #[serde(default)]
    pub tree: TreeConfig,
}

/// Merge scheduling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Interval between merge ticks
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Hand the drain to the host's idle hook instead of running it on the tick
    #[serde(default)]
    pub defer_to_idle: bool,

    /// A deferred drain runs anyway once this much time has passed
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    DEFAULT_MERGE_INTERVAL_MS
}

fn default_idle_timeout_ms() -> u64 {
    DEFAULT_IDLE_TIMEOUT_MS
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_MERGE_INTERVAL_MS,
            defer_to_idle: false,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

impl MergeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Change buffer policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Cap on buffered messages; oldest are dropped beyond it. Unbounded if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,
}

/// Topic tree storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Previous messages kept per topic
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Get the default config file path
pub fn default_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TopicTreeError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TopicTreeError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TopicTreeError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TopicTreeError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| {
            TopicTreeError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}
