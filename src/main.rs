//! Snapkeeper - Main entry point
//!
//! Periodic zip snapshots of a live directory tree with retention limits.

use anyhow::Result;
use clap::Parser;
use snapkeeper::hooks::{AlwaysActive, JsonStateStore, LogNotifier, MarkerFileLock, SettingsProvider};
use snapkeeper::runner::{BackupOutcome, BackupRunner};
use snapkeeper::{utils, BackupScheduler, Config};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Seconds between scheduler ticks
    #[arg(long, default_value_t = 60)]
    tick_secs: u64,

    /// Run a single backup attempt and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting snapkeeper v{} (tree: {})",
        env!("CARGO_PKG_VERSION"),
        config.backup.tree_id()
    );

    let backup = config.backup;
    let runner = Arc::new(BackupRunner::new(
        Arc::new(MarkerFileLock::new(&backup.lock_marker)),
        Arc::new(LogNotifier),
        backup.source_dir.clone(),
        backup.tree_id(),
        backup.output_dir.clone(),
        backup.lock_marker.clone(),
    ));
    let scheduler = BackupScheduler::new(
        Arc::new(SettingsProvider::new(backup.clone())),
        Arc::new(AlwaysActive),
        Arc::new(JsonStateStore::new(backup.state_file.clone())),
        runner,
    );

    if args.once {
        let result = scheduler.try_run(chrono::Utc::now().timestamp_millis()).await;
        tracing::info!(outcome = ?result.outcome, "Backup attempt finished");
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.tick_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let result = scheduler.try_run(chrono::Utc::now().timestamp_millis()).await;
                match &result.outcome {
                    BackupOutcome::Success | BackupOutcome::Failed(_) => {
                        tracing::info!(outcome = ?result.outcome, "Backup attempt finished");
                    }
                    _ => {
                        tracing::debug!(outcome = ?result.outcome, "Backup skipped");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
