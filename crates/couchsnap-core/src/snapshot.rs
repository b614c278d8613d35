//! The snapshot run: resolve the resume position, drain the feed into a
//! spool file, then commit the artifact and the new checkpoint.

use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use tracing::{info, warn};

use crate::checkpoint::RunMeta;
use crate::cursor;
use crate::error::Result;
use crate::feed::{ChangeFeed, FeedOptions, FeedTraversal};
use crate::writer::SnapshotWriter;

/// Settings for one snapshot run.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Database to snapshot.
    pub database: String,
    /// Whether deletion tombstones are written to the artifact.
    pub include_deletions: bool,
    /// Directory the artifact and checkpoint live in.
    pub output_dir: PathBuf,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub database: String,
    pub snapshot_path: PathBuf,
    pub meta_path: PathBuf,
    pub docs_written: u64,
    pub items_skipped: u64,
    pub final_seq: String,
}

/// One prepared snapshot run.
///
/// Filenames are fixed up front from the database name and the start time,
/// so callers can echo the output path before the feed is opened. `execute`
/// then drives the feed to completion.
pub struct SnapshotRun {
    config: SnapshotConfig,
    meta: RunMeta,
    meta_path: PathBuf,
    snapshot_path: PathBuf,
    temp_path: PathBuf,
}

impl SnapshotRun {
    pub fn new(config: SnapshotConfig) -> Self {
        let meta = RunMeta::new(&config.database);
        let safe_name = sanitize_database_name(&config.database);
        let timestamp = meta.start_time.to_rfc3339_opts(SecondsFormat::Secs, true);
        let filename = format!("{safe_name}-snapshot-{timestamp}.jsonl");

        let meta_path = config.output_dir.join(format!("{safe_name}-meta.json"));
        let snapshot_path = config.output_dir.join(&filename);
        let temp_path = config.output_dir.join(format!("_tmp_{filename}"));

        Self {
            config,
            meta,
            meta_path,
            snapshot_path,
            temp_path,
        }
    }

    /// Final path of the snapshot artifact.
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Path of the checkpoint file.
    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    /// Drive the feed from the resolved resume position to its current end,
    /// then commit the artifact and the new checkpoint.
    ///
    /// On error the previous checkpoint is left untouched and the spool
    /// file, if any, stays on disk for inspection.
    pub async fn execute<F: ChangeFeed>(mut self, feed: &F) -> Result<RunReport> {
        // A missing or corrupt checkpoint falls back to the beginning.
        self.meta.load_previous(&self.meta_path);
        let prior_since = self.meta.since.clone();

        info!(
            db = %self.config.database,
            since = %self.meta.truncated_since(),
            "spooling changes"
        );

        let mut writer = SnapshotWriter::create(&self.temp_path)?;
        let mut traversal = feed
            .open(FeedOptions {
                database: self.config.database.clone(),
                since: cursor::resolve_since(&prior_since).to_string(),
                include_docs: true,
            })
            .await?;

        let mut tracked_seq: Option<String> = None;
        let mut docs_written: u64 = 0;
        let mut items_skipped: u64 = 0;

        while let Some(item) = traversal.next_event().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "skipping failed feed item");
                    items_skipped += 1;
                    continue;
                }
            };

            if event.deleted && !self.config.include_deletions {
                // A filtered tombstone still advances the resume position.
                tracked_seq = Some(event.seq);
                continue;
            }

            let Some(doc) = event.export_doc() else {
                warn!(id = %event.id, "skipping change without a document body");
                items_skipped += 1;
                continue;
            };

            match writer.write(&doc) {
                Ok(()) => {
                    docs_written += 1;
                    tracked_seq = Some(event.seq);
                }
                Err(e) => {
                    warn!(id = %event.id, error = %e, "skipping unwritable document");
                    items_skipped += 1;
                }
            }
        }

        // The cursor only advances past items that were written or
        // deliberately filtered. An untouched feed takes the end-of-range
        // marker so an empty delta still converges.
        let final_seq = match tracked_seq {
            Some(seq) => seq,
            None if items_skipped == 0 => traversal.end_seq().unwrap_or(prior_since),
            None => prior_since,
        };

        writer.finalize(&self.snapshot_path)?;

        self.meta.record_end(final_seq.clone());
        self.meta.save(&self.meta_path)?;

        info!(
            db = %self.config.database,
            written = docs_written,
            skipped = items_skipped,
            meta = %self.meta_path.display(),
            "snapshot complete"
        );

        Ok(RunReport {
            database: self.config.database,
            snapshot_path: self.snapshot_path,
            meta_path: self.meta_path,
            docs_written,
            items_skipped,
            final_seq,
        })
    }
}

/// Make a database name safe for use in filenames by replacing whitespace
/// with underscores.
pub fn sanitize_database_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}
