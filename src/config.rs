//! Configuration management for the snapshot engine.
//!
//! Loads configuration from a TOML file; every field has a sensible default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backup: BackupConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Live directory tree to snapshot
    pub source_dir: PathBuf,

    /// Identifier used as the archive name prefix and entry root.
    /// Defaults to the file name of `source_dir`.
    #[serde(default)]
    pub tree_id: Option<String>,

    /// Directory the zip snapshots are written to
    pub output_dir: PathBuf,

    /// File name of the host's activity/lock marker inside the source tree.
    /// Never archived; its presence means the tree is busy.
    #[serde(default = "default_lock_marker")]
    pub lock_marker: String,

    /// Minimum time between two backup attempts, in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Maximum number of snapshots to keep (>= 1)
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,

    /// Maximum total bytes of all snapshots (0 = unlimited)
    #[serde(default)]
    pub max_total_bytes: u64,

    /// Where the durable schedule state (last run, paused) is persisted
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_lock_marker() -> String {
    "session.lock".to_string()
}

fn default_interval_secs() -> u64 {
    7200 // 2 hours
}

fn default_max_snapshots() -> usize {
    10
}

fn default_state_file() -> PathBuf {
    PathBuf::from("snapkeeper-state.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backup: BackupConfig {
                source_dir: PathBuf::from("world"),
                tree_id: None,
                output_dir: PathBuf::from("snapshots"),
                lock_marker: default_lock_marker(),
                interval_secs: default_interval_secs(),
                max_snapshots: default_max_snapshots(),
                max_total_bytes: 0,
                state_file: default_state_file(),
            },
            log: LogConfig {
                level: default_log_level(),
            },
        }
    }
}

impl BackupConfig {
    /// Archive name prefix: configured id, or the source directory's file name.
    pub fn tree_id(&self) -> String {
        match &self.tree_id {
            Some(id) => id.clone(),
            None => self
                .source_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "backup".to_string()),
        }
    }
}
