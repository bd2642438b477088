//! External collaborator seams.
//!
//! The engine consumes its host environment through narrow traits: a
//! non-blocking lock probe, an activity signal, a fire-and-forget notifier,
//! live configuration reads, and a durable state store. Production
//! implementations live here; tests substitute fakes.

use crate::error::{BackupError, Result};
use crate::scheduler::ScheduleState;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Non-blocking probe of the host's lock over the source tree.
pub trait HostLock: Send + Sync {
    /// Fails with `LockUnavailable` when another writer owns the tree.
    /// Never blocks or waits.
    fn check_available(&self, source_tree: &Path) -> Result<()>;
}

/// Gates whether a backup run is worthwhile at all.
pub trait ActivitySignal: Send + Sync {
    fn has_active_users(&self) -> bool;
}

/// Outbound notification sink, keyed by opaque message identifiers.
///
/// Fire-and-forget: implementations swallow their own delivery failures,
/// a lost notification never aborts a run.
pub trait Notifier: Send + Sync {
    fn broadcast(&self, key: &str, args: &[String]);
}

/// Live configuration reads; values may change between calls.
pub trait ConfigProvider: Send + Sync {
    fn interval_ms(&self) -> i64;
    fn max_snapshots(&self) -> usize;
    fn max_total_bytes(&self) -> u64;
}

/// Durable persistence for the scheduler state.
pub trait StateStore: Send + Sync {
    /// Missing or corrupt persisted state loads as defaults.
    fn load(&self) -> ScheduleState;
    fn save(&self, state: &ScheduleState) -> Result<()>;
}

/// Treats the source tree as busy while the host's marker file exists.
pub struct MarkerFileLock {
    marker: String,
}

impl MarkerFileLock {
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.to_string(),
        }
    }
}

impl HostLock for MarkerFileLock {
    fn check_available(&self, source_tree: &Path) -> Result<()> {
        if source_tree.join(&self.marker).exists() {
            Err(BackupError::LockUnavailable(format!(
                "{} present in {}",
                self.marker,
                source_tree.display()
            )))
        } else {
            Ok(())
        }
    }
}

/// Activity signal for hosts without a user roster: always run.
pub struct AlwaysActive;

impl ActivitySignal for AlwaysActive {
    fn has_active_users(&self) -> bool {
        true
    }
}

/// Notifier that routes broadcasts into the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn broadcast(&self, key: &str, args: &[String]) {
        info!(message = %key, args = ?args, "Broadcast");
    }
}

/// `ConfigProvider` backed by the loaded TOML settings.
pub struct SettingsProvider {
    backup: crate::config::BackupConfig,
}

impl SettingsProvider {
    pub fn new(backup: crate::config::BackupConfig) -> Self {
        Self { backup }
    }
}

impl ConfigProvider for SettingsProvider {
    fn interval_ms(&self) -> i64 {
        (self.backup.interval_secs as i64).saturating_mul(1000)
    }

    fn max_snapshots(&self) -> usize {
        self.backup.max_snapshots.max(1)
    }

    fn max_total_bytes(&self) -> u64 {
        self.backup.max_total_bytes
    }
}

/// `StateStore` persisting to a small JSON file.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> ScheduleState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return ScheduleState::default(), // first run
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt schedule state, falling back to defaults");
                ScheduleState::default()
            }
        }
    }

    fn save(&self, state: &ScheduleState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| BackupError::State(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
