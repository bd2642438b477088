//! Custom error types for the snapshot engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Source tree is locked: {0}")]
    LockUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("State error: {0}")]
    State(String),
}

pub type Result<T> = std::result::Result<T, BackupError>;
