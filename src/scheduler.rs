//! Backup scheduling: gate checks, single-flight execution, durable state.
//!
//! `try_run` decides whether a backup should happen now (pause flag, activity
//! signal, elapsed-time gate), makes room under the count limit, and executes
//! the runner on the blocking pool. At most one run is in flight at a time.

use crate::hooks::{ActivitySignal, ConfigProvider, StateStore};
use crate::retention::{self, RetentionPolicy};
use crate::runner::{BackupOutcome, BackupResult, BackupRunner};
use crate::snapshot;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Durable scheduler state, persisted across restarts through a `StateStore`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScheduleState {
    /// Timestamp of the last admitted backup attempt, epoch milliseconds.
    /// Reset on every attempt, not only on success, so a failing backup does
    /// not hammer retries every tick.
    #[serde(default)]
    pub last_run_ms: i64,

    #[serde(default)]
    pub paused: bool,
}

pub struct BackupScheduler {
    config: Arc<dyn ConfigProvider>,
    activity: Arc<dyn ActivitySignal>,
    store: Arc<dyn StateStore>,
    runner: Arc<BackupRunner>,
    state: Mutex<ScheduleState>,
    running: AtomicBool,
}

impl BackupScheduler {
    /// Build a scheduler, loading the initial state from the store.
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        activity: Arc<dyn ActivitySignal>,
        store: Arc<dyn StateStore>,
        runner: Arc<BackupRunner>,
    ) -> Self {
        let state = store.load();
        Self {
            config,
            activity,
            store,
            runner,
            state: Mutex::new(state),
            running: AtomicBool::new(false),
        }
    }

    /// Attempt a backup at `now_ms`.
    ///
    /// Returns without side effects when paused, when nobody is active, when
    /// the configured interval has not elapsed, or when a run is already in
    /// flight (concurrent calls never queue). Otherwise the attempt timestamp
    /// is persisted immediately and the run executes on the blocking pool.
    pub async fn try_run(&self, now_ms: i64) -> BackupResult {
        if self.state().paused {
            return BackupResult::skipped(BackupOutcome::NoOpPaused);
        }

        if !self.activity.has_active_users() {
            return BackupResult::skipped(BackupOutcome::NoOpNoActivity);
        }

        let interval_ms = self.config.interval_ms();
        if now_ms - self.state().last_run_ms < interval_ms {
            return BackupResult::skipped(BackupOutcome::NoOpTooSoon);
        }

        // Single-flight: two callers can never both observe Idle
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return BackupResult::skipped(BackupOutcome::NoOpInFlight);
        }

        let policy = RetentionPolicy {
            max_snapshots: self.config.max_snapshots().max(1),
            max_total_bytes: self.config.max_total_bytes(),
        };

        // Timer resets on the attempt, success or not
        self.record_attempt(now_ms);

        let runner = Arc::clone(&self.runner);
        let result = tokio::task::spawn_blocking(move || {
            make_room(runner.output_dir(), &policy);
            runner.run(now_ms, &policy)
        })
        .await;

        self.running.store(false, Ordering::SeqCst);

        match result {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Backup worker aborted");
                BackupResult {
                    archive_path: None,
                    size_bytes: 0,
                    elapsed_ms: 0,
                    outcome: BackupOutcome::Failed(format!("worker aborted: {e}")),
                }
            }
        }
    }

    pub fn pause(&self) {
        self.update_state(|state| state.paused = true);
        info!("Backups paused");
    }

    pub fn resume(&self) {
        self.update_state(|state| state.paused = false);
        info!("Backups resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    /// Timestamp of the last admitted attempt.
    pub fn last_run_ms(&self) -> i64 {
        self.state().last_run_ms
    }

    fn state(&self) -> ScheduleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_attempt(&self, now_ms: i64) {
        self.update_state(|state| state.last_run_ms = now_ms);
    }

    /// Apply a mutation and persist the dirty state.
    fn update_state(&self, mutate: impl FnOnce(&mut ScheduleState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        mutate(&mut state);
        if let Err(e) = self.store.save(&state) {
            warn!(error = %e, "Failed to persist schedule state");
        }
    }
}

/// Pre-run count-based eviction: trim the on-disk listing so the snapshot
/// about to be written never pushes the count past the limit.
fn make_room(output_dir: &Path, policy: &RetentionPolicy) {
    let existing = match snapshot::list_snapshots(output_dir) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Could not list snapshots for pre-run eviction");
            return;
        }
    };

    let keep = policy.max_snapshots.saturating_sub(1);
    let victims = retention::select_for_count(&existing, keep);
    if !victims.is_empty() {
        info!(count = victims.len(), "Evicting old snapshots to stay under the count limit");
        snapshot::delete_snapshots(&victims);
    }
}
