use thiserror::Error;

/// Errors that can occur in couchsnap-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open snapshot output: {0}")]
    OutputOpen(std::io::Error),

    #[error("failed to write snapshot output: {0}")]
    OutputWrite(std::io::Error),

    #[error("failed to commit snapshot: {0}")]
    Commit(std::io::Error),

    #[error("failed to save checkpoint: {0}")]
    CheckpointSave(std::io::Error),

    #[error("feed error: {0}")]
    Feed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
