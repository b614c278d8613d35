//! Run metadata persistence.
//!
//! Each database gets a `<name>-meta.json` file recording the sequence
//! token the last completed run finished at, so the next invocation resumes
//! from there instead of re-reading the whole feed.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cursor;
use crate::error::{Error, Result};

/// Metadata for one snapshot run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    /// Sequence token the run finished at.
    pub since: String,
    /// When the run started.
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    /// When the run finished draining the feed.
    #[serde(rename = "endTime", default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Database the snapshot was taken from.
    pub db: String,
}

impl RunMeta {
    /// Start a new record for `db` with an empty cursor.
    pub fn new(db: impl Into<String>) -> Self {
        Self {
            since: String::new(),
            start_time: Utc::now(),
            end_time: None,
            db: db.into(),
        }
    }

    /// Adopt the cursor from a previous run's metadata file.
    ///
    /// Any read or parse failure leaves the cursor empty: a missing or
    /// corrupt checkpoint must never block a fresh export.
    pub fn load_previous(&mut self, path: &Path) {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no previous checkpoint");
                return;
            }
        };

        match serde_json::from_str::<serde_json::Value>(&contents) {
            Ok(prev) => {
                if let Some(since) = prev.get("since").and_then(|s| s.as_str()) {
                    self.since = since.to_string();
                }
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring unreadable checkpoint");
            }
        }
    }

    /// Mark the end of a run at the given sequence token.
    pub fn record_end(&mut self, since: String) {
        self.since = since;
        self.end_time = Some(Utc::now());
    }

    /// Write the record to `path` as JSON, overwriting any prior content.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json).map_err(Error::CheckpointSave)
    }

    /// The stored cursor, shortened for log output.
    pub fn truncated_since(&self) -> &str {
        cursor::truncate_seq(&self.since)
    }
}
