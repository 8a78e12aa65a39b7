//! Error types for the extraction engine
//!
//! Errors fall into two classes. Fatal errors (a malformed filter, an
//! unreadable checkpoint, a failed checkpoint flush, bad configuration) abort
//! the whole run. Everything else is scoped to the survey being processed:
//! the survey is reported as failed, its bookmark stays where it was and the
//! run moves on to the next survey.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// Network or HTTP client failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote API answered, but not with a usable result
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// A non-final page came back smaller than the requested page size
    #[error("Page {page} returned {received} records, expected {expected}; the source reduced its page size mid-run")]
    ShortPage {
        page: u32,
        expected: u32,
        received: usize,
    },

    /// Filter built with an operator the remote API does not understand
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// The checkpoint file exists but cannot be read or parsed
    #[error("Checkpoint file '{}' is corrupt: {reason}. Fix or remove it by hand; refusing to reset bookmarks.", path.display())]
    CheckpointCorrupt { path: PathBuf, reason: String },

    /// The checkpoint could not be durably written
    #[error("Failed to write checkpoint '{}': {reason}", path.display())]
    CheckpointWrite { path: PathBuf, reason: String },

    /// Object-store upload failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables or .env file.")]
    Config(String),

    /// A record from the source does not have the expected shape
    #[error("Unexpected record shape: {0}")]
    Record(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExtractError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn record(msg: impl Into<String>) -> Self {
        Self::Record(msg.into())
    }

    pub fn checkpoint_corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CheckpointCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn checkpoint_write(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CheckpointWrite {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error must abort the whole run rather than one survey
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidFilter(_)
                | Self::CheckpointCorrupt { .. }
                | Self::CheckpointWrite { .. }
                | Self::Config(_)
        )
    }

    /// Errors a halved page size may fix
    pub fn is_retryable_with_smaller_pages(&self) -> bool {
        match self {
            Self::ShortPage { .. } | Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ExtractError::invalid_filter("~=").is_fatal());
        assert!(ExtractError::checkpoint_corrupt("state.json", "eof").is_fatal());
        assert!(ExtractError::checkpoint_write("state.json", "disk full").is_fatal());
        assert!(!ExtractError::api(502, "bad gateway").is_fatal());
        assert!(!ExtractError::storage("denied").is_fatal());
    }

    #[test]
    fn test_retryable_with_smaller_pages() {
        let short = ExtractError::ShortPage {
            page: 2,
            expected: 500,
            received: 250,
        };
        assert!(short.is_retryable_with_smaller_pages());
        assert!(ExtractError::api(503, "unavailable").is_retryable_with_smaller_pages());
        assert!(!ExtractError::api(401, "unauthorized").is_retryable_with_smaller_pages());
        assert!(!ExtractError::invalid_filter("like").is_retryable_with_smaller_pages());
    }

    #[test]
    fn test_checkpoint_corrupt_message_names_file() {
        let err = ExtractError::checkpoint_corrupt("/data/state.json", "expected value");
        assert!(err.to_string().contains("/data/state.json"));
    }
}
