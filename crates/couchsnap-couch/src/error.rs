use thiserror::Error;

#[derive(Debug, Error)]
pub enum CouchError {
    #[error("invalid service url: {0}")]
    InvalidUrl(String),

    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },

    #[error("http client error: {0}")]
    Client(String),

    #[error("changes request failed: {0}")]
    Request(String),

    #[error("changes request returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CouchError {
    /// Whether a failed request is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            CouchError::Request(_) => true,
            CouchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CouchError {
    fn from(e: reqwest::Error) -> Self {
        CouchError::Request(e.to_string())
    }
}

pub type CouchResult<T> = Result<T, CouchError>;
