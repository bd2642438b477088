//! Snapkeeper Library
//!
//! Periodic zip snapshots of a live directory tree with count-based and
//! disk-size-based retention.

pub mod archive;
pub mod config;
pub mod error;
pub mod hooks;
pub mod retention;
pub mod runner;
pub mod scheduler;
pub mod snapshot;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::BackupError;
pub use retention::RetentionPolicy;
pub use runner::{BackupOutcome, BackupResult};
pub use scheduler::BackupScheduler;
pub use snapshot::SnapshotDescriptor;
pub type Result<T> = std::result::Result<T, BackupError>;
