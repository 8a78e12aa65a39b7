//! Error types shared across SurveySync crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for shared utilities
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}
