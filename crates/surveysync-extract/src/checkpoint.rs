//! Durable per-survey bookmarks
//!
//! The checkpoint is a small, hand-editable JSON document:
//!
//! ```json
//! { "bookmarks": { "42": "2024-10-01T06:00:00-05:00" } }
//! ```
//!
//! [`CheckpointStore::commit`] only touches memory. [`CheckpointStore::flush`]
//! stages the whole map in a temporary file next to the target and renames it
//! into place, so a crash at any point leaves either the old or the new file.

use crate::error::{ExtractError, Result};
use crate::storage::write_atomic;
use crate::window::{parse_timestamp, Bookmarks};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckpointFile {
    bookmarks: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    tz: FixedOffset,
    bookmarks: Bookmarks,
    dirty: bool,
}

impl CheckpointStore {
    /// Load bookmarks from `path`; a missing file is a first run.
    ///
    /// An unreadable or malformed file is [`ExtractError::CheckpointCorrupt`]
    /// and is never silently replaced by an empty map.
    pub fn load(path: impl Into<PathBuf>, tz: FixedOffset) -> Result<Self> {
        let path = path.into();

        let bookmarks = match std::fs::read_to_string(&path) {
            Ok(contents) => parse(&path, &contents, tz)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No checkpoint found, starting from scratch");
                Bookmarks::new()
            },
            Err(e) => return Err(ExtractError::checkpoint_corrupt(&path, e.to_string())),
        };

        debug!(path = %path.display(), bookmarks = bookmarks.len(), "Loaded checkpoint");
        Ok(Self {
            path,
            tz,
            bookmarks,
            dirty: false,
        })
    }

    pub fn bookmarks(&self) -> &Bookmarks {
        &self.bookmarks
    }

    pub fn get(&self, resource_id: &str) -> Option<DateTime<FixedOffset>> {
        self.bookmarks.get(resource_id).copied()
    }

    /// Record `end` as the bookmark of `resource_id`, in memory only
    pub fn commit(&mut self, resource_id: impl Into<String>, end: DateTime<FixedOffset>) {
        self.bookmarks
            .insert(resource_id.into(), end.with_timezone(&self.tz));
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Durably replace the checkpoint file with the in-memory map
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let file = CheckpointFile {
            bookmarks: self
                .bookmarks
                .iter()
                .map(|(id, ts)| (id.clone(), ts.to_rfc3339()))
                .collect(),
        };
        let mut payload = serde_json::to_vec_pretty(&file)?;
        payload.push(b'\n');

        write_atomic(&self.path, &payload)
            .map_err(|e| ExtractError::checkpoint_write(&self.path, e.to_string()))?;

        self.dirty = false;
        debug!(path = %self.path.display(), bookmarks = self.bookmarks.len(), "Checkpoint flushed");
        Ok(())
    }
}

fn parse(path: &Path, contents: &str, tz: FixedOffset) -> Result<Bookmarks> {
    let file: CheckpointFile = serde_json::from_str(contents)
        .map_err(|e| ExtractError::checkpoint_corrupt(path, e.to_string()))?;

    file.bookmarks
        .into_iter()
        .map(|(id, raw)| {
            parse_timestamp(&raw, tz)
                .map(|ts| (id.clone(), ts))
                .map_err(|_| {
                    ExtractError::checkpoint_corrupt(
                        path,
                        format!("bookmark for '{}' has invalid timestamp '{}'", id, raw),
                    )
                })
        })
        .collect()
}
