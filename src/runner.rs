//! End-to-end execution of a single backup run.
//!
//! A run probes the host lock, writes the snapshot, enforces the disk-size
//! cap over the updated listing, and reports start/finish/failure through the
//! notifier. Everything here is blocking; the scheduler puts it on a worker.

use crate::archive;
use crate::error::BackupError;
use crate::hooks::{HostLock, Notifier};
use crate::retention::{self, RetentionPolicy};
use crate::snapshot;
use crate::utils::format::{format_bytes, format_elapsed};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Success,
    NoOpPaused,
    NoOpNoActivity,
    NoOpTooSoon,
    NoOpInFlight,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct BackupResult {
    /// Path of the archive written by this run, on success
    pub archive_path: Option<PathBuf>,

    /// Size of that archive in bytes
    pub size_bytes: u64,

    /// Wall-clock duration of the archiving step
    pub elapsed_ms: u64,

    pub outcome: BackupOutcome,
}

impl BackupResult {
    pub(crate) fn skipped(outcome: BackupOutcome) -> Self {
        Self {
            archive_path: None,
            size_bytes: 0,
            elapsed_ms: 0,
            outcome,
        }
    }

    fn failed(reason: String, elapsed_ms: u64) -> Self {
        Self {
            archive_path: None,
            size_bytes: 0,
            elapsed_ms,
            outcome: BackupOutcome::Failed(reason),
        }
    }
}

pub struct BackupRunner {
    lock: Arc<dyn HostLock>,
    notifier: Arc<dyn Notifier>,
    source_root: PathBuf,
    tree_id: String,
    output_dir: PathBuf,
    lock_marker: String,
}

impl BackupRunner {
    pub fn new(
        lock: Arc<dyn HostLock>,
        notifier: Arc<dyn Notifier>,
        source_root: PathBuf,
        tree_id: String,
        output_dir: PathBuf,
        lock_marker: String,
    ) -> Self {
        Self {
            lock,
            notifier,
            source_root,
            tree_id,
            output_dir,
            lock_marker,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Execute one run end to end. Errors never escape: every failure is
    /// converted to a `Failed` result at this boundary.
    pub fn run(&self, now_ms: i64, policy: &RetentionPolicy) -> BackupResult {
        let started = Instant::now();

        if let Err(e) = self.lock.check_available(&self.source_root) {
            return self.fail(e, started);
        }

        info!(source = %self.source_root.display(), "Backup started");
        self.notifier.broadcast("backup_started", &[]);

        let snapshot = match archive::create_snapshot(
            &self.source_root,
            &self.tree_id,
            &self.output_dir,
            &self.lock_marker,
            now_ms,
        ) {
            Ok(s) => s,
            Err(e) => return self.fail(e, started),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let folder_size = self.enforce_size_cap(policy);

        let elapsed = format_elapsed(elapsed_ms);
        let archive_size = format_bytes(snapshot.size_bytes);
        let total_size = format_bytes(folder_size);
        info!(
            archive = %snapshot.path.display(),
            size = %archive_size,
            elapsed = %elapsed,
            folder = %total_size,
            "Backup finished"
        );
        self.notifier
            .broadcast("backup_finished", &[elapsed, archive_size, total_size]);

        BackupResult {
            archive_path: Some(snapshot.path),
            size_bytes: snapshot.size_bytes,
            elapsed_ms,
            outcome: BackupOutcome::Success,
        }
    }

    fn fail(&self, e: BackupError, started: Instant) -> BackupResult {
        let reason = e.to_string();
        error!(error = %reason, "Backup failed");
        self.notifier.broadcast("backup_failed", &[reason.clone()]);
        BackupResult::failed(reason, started.elapsed().as_millis() as u64)
    }

    /// Size-based eviction over the fresh listing, new snapshot included.
    /// Returns the remaining total size of the output directory.
    fn enforce_size_cap(&self, policy: &RetentionPolicy) -> u64 {
        let existing = match snapshot::list_snapshots(&self.output_dir) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Cannot delete old snapshots to save disk space");
                return 0;
            }
        };

        let plan = retention::select_for_size(&existing, policy.max_total_bytes);
        if !plan.victims.is_empty() {
            snapshot::delete_snapshots(&plan.victims);
        }
        if plan.last_oversized {
            error!("Cannot free more disk space: only one snapshot left and it still exceeds the cap");
        }

        snapshot::list_snapshots(&self.output_dir)
            .map(|s| snapshot::total_size(&s))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const NOW_MS: i64 = 1_700_000_000_000;

    struct FakeLock {
        available: AtomicBool,
    }

    impl FakeLock {
        fn new(available: bool) -> Self {
            Self {
                available: AtomicBool::new(available),
            }
        }
    }

    impl HostLock for FakeLock {
        fn check_available(&self, _source_tree: &Path) -> Result<()> {
            if self.available.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(BackupError::LockUnavailable("busy".to_string()))
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl Notifier for RecordingNotifier {
        fn broadcast(&self, key: &str, args: &[String]) {
            self.messages
                .lock()
                .unwrap()
                .push((key.to_string(), args.to_vec()));
        }
    }

    fn make_runner(
        temp: &TempDir,
        lock_available: bool,
    ) -> (BackupRunner, Arc<RecordingNotifier>, PathBuf) {
        let source = temp.path().join("world");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("level.dat"), b"level data").unwrap();
        let output = temp.path().join("snapshots");
        let notifier = Arc::new(RecordingNotifier::default());

        let runner = BackupRunner::new(
            Arc::new(FakeLock::new(lock_available)),
            notifier.clone(),
            source,
            "world".to_string(),
            output.clone(),
            "session.lock".to_string(),
        );
        (runner, notifier, output)
    }

    fn policy(max_snapshots: usize, max_total_bytes: u64) -> RetentionPolicy {
        RetentionPolicy {
            max_snapshots,
            max_total_bytes,
        }
    }

    #[test]
    fn test_successful_run() {
        let temp = TempDir::new().unwrap();
        let (runner, notifier, output) = make_runner(&temp, true);

        let result = runner.run(NOW_MS, &policy(10, 0));

        assert_eq!(result.outcome, BackupOutcome::Success);
        let archive_path = result.archive_path.unwrap();
        assert!(archive_path.exists());
        assert!(result.size_bytes > 0);
        assert_eq!(fs::read_dir(&output).unwrap().count(), 1);

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages[0].0, "backup_started");
        assert_eq!(messages[1].0, "backup_finished");
        // elapsed, archive size, folder size
        assert_eq!(messages[1].1.len(), 3);
    }

    #[test]
    fn test_locked_tree_fails_fast() {
        let temp = TempDir::new().unwrap();
        let (runner, notifier, output) = make_runner(&temp, false);

        let result = runner.run(NOW_MS, &policy(10, 0));

        assert!(matches!(result.outcome, BackupOutcome::Failed(_)));
        assert!(result.archive_path.is_none());
        // nothing written
        assert!(!output.exists());

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "backup_failed");
    }

    #[test]
    fn test_missing_source_tree_fails() {
        let temp = TempDir::new().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = BackupRunner::new(
            Arc::new(FakeLock::new(true)),
            notifier.clone(),
            temp.path().join("gone"),
            "gone".to_string(),
            temp.path().join("snapshots"),
            "session.lock".to_string(),
        );

        let result = runner.run(NOW_MS, &policy(10, 0));
        assert!(matches!(result.outcome, BackupOutcome::Failed(_)));

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.last().unwrap().0, "backup_failed");
    }

    #[test]
    fn test_size_cap_evicts_after_run_but_keeps_newest() {
        let temp = TempDir::new().unwrap();
        let (runner, _notifier, output) = make_runner(&temp, true);

        // Pre-existing old snapshots, clearly older than the new one
        fs::create_dir_all(&output).unwrap();
        for (i, name) in ["world_old.zip", "world_older.zip"].iter().enumerate() {
            let path = output.join(name);
            fs::write(&path, vec![0u8; 4096]).unwrap();
            let old = std::time::SystemTime::UNIX_EPOCH
                + std::time::Duration::from_secs(1_000_000 + i as u64);
            let file = fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(old).unwrap();
        }

        // Cap of 1 byte forces eviction down to a single survivor
        let result = runner.run(NOW_MS, &policy(10, 1));
        assert_eq!(result.outcome, BackupOutcome::Success);

        let remaining = crate::snapshot::list_snapshots(&output).unwrap();
        assert_eq!(remaining.len(), 1);
        // the survivor is the snapshot this run produced
        assert_eq!(Some(remaining[0].path.clone()), result.archive_path);
    }
}
