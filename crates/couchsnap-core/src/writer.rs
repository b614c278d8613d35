use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Line-oriented JSON writer for the snapshot artifact.
///
/// Documents are spooled to a temporary path and only promoted to the final
/// name by [`SnapshotWriter::finalize`], so a partially written snapshot is
/// never visible under its final name.
pub struct SnapshotWriter {
    out: BufWriter<File>,
    temp_path: PathBuf,
}

impl SnapshotWriter {
    /// Create the temporary output file, truncating any leftover from an
    /// earlier failed run.
    pub fn create(temp_path: impl Into<PathBuf>) -> Result<Self> {
        let temp_path = temp_path.into();
        let file = File::create(&temp_path).map_err(Error::OutputOpen)?;
        Ok(Self {
            out: BufWriter::new(file),
            temp_path,
        })
    }

    /// Append one document as a single JSON line.
    pub fn write(&mut self, doc: &serde_json::Value) -> Result<()> {
        let line = serde_json::to_string(doc)?;
        self.out
            .write_all(line.as_bytes())
            .map_err(Error::OutputWrite)?;
        self.out.write_all(b"\n").map_err(Error::OutputWrite)
    }

    /// Flush, close, and atomically rename the temp file to `final_path`.
    /// On failure the temp file is left in place for inspection.
    pub fn finalize(self, final_path: &Path) -> Result<()> {
        let file = self
            .out
            .into_inner()
            .map_err(|e| Error::Commit(e.into_error()))?;
        file.sync_all().map_err(Error::Commit)?;
        drop(file);
        std::fs::rename(&self.temp_path, final_path).map_err(Error::Commit)
    }

    /// Path of the temporary spool file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }
}
