//! SurveySync extraction engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incrementally extracts surveys, questions, campaigns and responses from
//! the survey platform's REST API and lands them as gzip-compressed JSON in
//! an object store, resuming from a per-survey bookmark on every run.
//!
//! # Overview
//!
//! - **Pagination**: [`paginator::Paginator`] walks a list endpoint to the end;
//!   [`paginator::Query`] composes filters in front of it
//! - **Filters**: [`filter::FilterSet`], an ordered conjunction of `=`, `>=`, `<`
//! - **Windows**: [`window::WindowCalculator`] derives `[bookmark, now - lag)`
//! - **Skip policy**: [`skip`] leaves archived, unmodified surveys alone
//! - **Export**: [`export::ExportSink`] encodes batches and uploads them to an
//!   [`storage::ObjectStore`]
//! - **Checkpoint**: [`checkpoint::CheckpointStore`] persists bookmarks atomically
//! - **Driver**: [`pipeline::Extractor`] composes all of the above
//!
//! The `surveysync` binary wraps these in the [`Cli`].

pub mod alert;
pub mod api;
pub mod checkpoint;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod options;
pub mod paginator;
pub mod pipeline;
pub mod skip;
pub mod storage;
pub mod window;

// Re-export commonly used types
pub use cli::{Cli, Commands};
pub use error::{ExtractError, Result};
pub use pipeline::{Extractor, RunReport};
