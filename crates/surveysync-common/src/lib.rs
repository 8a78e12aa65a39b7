//! SurveySync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities and error handling for the SurveySync workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`SyncError`] and the [`Result`] alias
//! - **Checksums**: SHA-256 digests of export payloads and files
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use surveysync_common::{checksum, Result};
//!
//! fn fingerprint(path: &str) -> Result<()> {
//!     let digest = checksum::sha256_file(path)?;
//!     tracing::info!(%digest, "payload fingerprint");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, SyncError};
