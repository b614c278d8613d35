//! Service configuration from the environment.
//!
//! Connection details never come from the command line: the tool is meant
//! to run from cron, so credentials live in the environment (or a `.env`
//! file loaded by the binary before this module runs).

use std::time::Duration;

use url::Url;

use crate::error::{CouchError, CouchResult};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Connection settings for the CouchDB service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the service, e.g. `https://host:6984`.
    pub url: Url,
    /// Basic-auth username, if the service requires authentication.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How many times a transient request failure is retried.
    pub max_retries: u32,
    /// Number of changes requested per page of the traversal.
    pub page_size: u32,
}

impl ServiceConfig {
    /// Build a config from `COUCH_*` environment variables.
    ///
    /// `COUCH_URL` is required; `COUCH_USERNAME`, `COUCH_PASSWORD`,
    /// `COUCH_TIMEOUT_SECS` and `COUCH_MAX_RETRIES` are optional.
    pub fn from_env() -> CouchResult<Self> {
        let raw_url = std::env::var("COUCH_URL")
            .map_err(|_| CouchError::MissingEnv("COUCH_URL".into()))?;
        let url = Url::parse(&raw_url).map_err(|_| CouchError::InvalidUrl(raw_url.clone()))?;

        let timeout_secs = parse_env_var("COUCH_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let max_retries = parse_env_var("COUCH_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;

        Ok(Self {
            url,
            username: std::env::var("COUCH_USERNAME").ok(),
            password: std::env::var("COUCH_PASSWORD").ok(),
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }
}

fn parse_env_var<T: std::str::FromStr>(var: &str, default: T) -> CouchResult<T> {
    match std::env::var(var) {
        Ok(value) => value.parse().map_err(|_| CouchError::InvalidEnv {
            var: var.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}
