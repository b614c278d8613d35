//! One-off traversal of the CouchDB `_changes` feed.
//!
//! The feed is read with `feed=normal` in pages of `page_size` rows,
//! following `last_seq` until the server reports nothing pending. Transient
//! request failures are retried with exponential backoff; the snapshot
//! engine never sees the paging or the retries.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use couchsnap_core::Error as CoreError;
use couchsnap_core::{ChangeEvent, ChangeFeed, FeedItem, FeedOptions, FeedTraversal};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::ServiceConfig;
use crate::error::{CouchError, CouchResult};

/// One page of a `_changes` response.
///
/// Rows are kept as raw JSON so a single malformed row surfaces as one
/// skippable item instead of poisoning the whole page.
#[derive(Debug, Deserialize)]
struct ChangesPage {
    results: Vec<serde_json::Value>,
    last_seq: String,
    #[serde(default)]
    pending: Option<u64>,
}

/// One row of a `_changes` page.
#[derive(Debug, Deserialize)]
struct ChangeRow {
    seq: String,
    id: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    doc: Option<serde_json::Value>,
}

/// HTTP client for the CouchDB `_changes` API.
#[derive(Clone)]
pub struct CouchClient {
    http: reqwest::Client,
    config: ServiceConfig,
}

impl CouchClient {
    pub fn new(config: ServiceConfig) -> CouchResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CouchError::Client(e.to_string()))?;

        Ok(Self { http, config })
    }

    fn changes_url(&self, database: &str) -> CouchResult<Url> {
        let mut url = self.config.url.clone();
        url.path_segments_mut()
            .map_err(|_| CouchError::InvalidUrl(self.config.url.to_string()))?
            .pop_if_empty()
            .push(database)
            .push("_changes");
        Ok(url)
    }

    /// Fetch one page, retrying transient failures with exponential
    /// backoff.
    async fn fetch_page(
        &self,
        database: &str,
        since: &str,
        include_docs: bool,
    ) -> CouchResult<ChangesPage> {
        let url = self.changes_url(database)?;
        let base_delay_ms = 500u64;

        for attempt in 0..=self.config.max_retries {
            match self.fetch_page_once(url.clone(), since, include_docs).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay_ms = base_delay_ms * (1 << attempt);
                    warn!(
                        db = database,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms,
                        error = %e,
                        "changes request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!()
    }

    async fn fetch_page_once(
        &self,
        url: Url,
        since: &str,
        include_docs: bool,
    ) -> CouchResult<ChangesPage> {
        let limit = self.config.page_size.to_string();
        let mut request = self.http.get(url).query(&[
            ("feed", "normal"),
            ("style", "main_only"),
            ("since", since),
            ("limit", limit.as_str()),
            ("include_docs", if include_docs { "true" } else { "false" }),
        ]);

        if let Some(ref username) = self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CouchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

impl ChangeFeed for CouchClient {
    type Traversal = ChangesTraversal;

    fn open(
        &self,
        opts: FeedOptions,
    ) -> impl Future<Output = couchsnap_core::Result<ChangesTraversal>> + Send {
        let client = self.clone();
        async move {
            // The first page is fetched eagerly, so a missing database or
            // an unreachable server fails the run before anything streams.
            let page = client
                .fetch_page(&opts.database, &opts.since, opts.include_docs)
                .await
                .map_err(|e| CoreError::Feed(e.to_string()))?;

            debug!(db = %opts.database, rows = page.results.len(), "opened changes traversal");

            Ok(ChangesTraversal::new(client, opts, page))
        }
    }
}

/// A single pass over the feed, following `last_seq` until the server has
/// nothing pending.
pub struct ChangesTraversal {
    client: CouchClient,
    opts: FeedOptions,
    buffer: VecDeque<serde_json::Value>,
    next_since: String,
    last_seq: Option<String>,
    exhausted: bool,
}

impl ChangesTraversal {
    fn new(client: CouchClient, opts: FeedOptions, first: ChangesPage) -> Self {
        let mut traversal = Self {
            client,
            opts,
            buffer: VecDeque::new(),
            next_since: String::new(),
            last_seq: None,
            exhausted: false,
        };
        traversal.absorb(first);
        traversal
    }

    fn absorb(&mut self, page: ChangesPage) {
        self.exhausted = page.results.is_empty() || page.pending == Some(0);
        self.next_since = page.last_seq.clone();
        self.last_seq = Some(page.last_seq);
        self.buffer.extend(page.results);
    }

    fn convert(row: serde_json::Value) -> FeedItem {
        let row: ChangeRow = serde_json::from_value(row)
            .map_err(|e| CoreError::Feed(format!("malformed change row: {e}")))?;

        Ok(ChangeEvent {
            seq: row.seq,
            id: row.id,
            deleted: row.deleted,
            doc: row.doc,
        })
    }
}

impl FeedTraversal for ChangesTraversal {
    fn next_event(&mut self) -> impl Future<Output = Option<FeedItem>> + Send {
        async move {
            loop {
                if let Some(row) = self.buffer.pop_front() {
                    return Some(Self::convert(row));
                }
                if self.exhausted {
                    return None;
                }

                let page = self
                    .client
                    .fetch_page(&self.opts.database, &self.next_since, self.opts.include_docs)
                    .await;

                match page {
                    Ok(page) => self.absorb(page),
                    Err(e) => {
                        // A page that still fails after the retry budget
                        // ends the traversal; the cursor stays at the last
                        // item the caller accepted, so the next run picks
                        // up from there.
                        self.exhausted = true;
                        return Some(Err(CoreError::Feed(e.to_string())));
                    }
                }
            }
        }
    }

    fn end_seq(&self) -> Option<String> {
        self.last_seq.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_client() -> CouchClient {
        CouchClient::new(ServiceConfig {
            url: Url::parse("http://localhost:5984").unwrap(),
            username: None,
            password: None,
            timeout: Duration::from_secs(5),
            max_retries: 0,
            page_size: 100,
        })
        .unwrap()
    }

    fn make_opts() -> FeedOptions {
        FeedOptions {
            database: "orders".into(),
            since: "0".into(),
            include_docs: true,
        }
    }

    fn page(rows: Vec<serde_json::Value>, last_seq: &str, pending: u64) -> ChangesPage {
        ChangesPage {
            results: rows,
            last_seq: last_seq.into(),
            pending: Some(pending),
        }
    }

    #[test]
    fn test_changes_url_encodes_database_name() {
        let client = make_client();

        let url = client.changes_url("orders").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5984/orders/_changes");

        let url = client.changes_url("acme/orders").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5984/acme%2Forders/_changes");
    }

    #[test]
    fn test_changes_page_deserialization() {
        let raw = r#"{
            "results": [
                {"seq": "1-a", "id": "doc1", "changes": [{"rev": "1-x"}], "doc": {"_id": "doc1", "_rev": "1-x"}},
                {"seq": "2-b", "id": "doc2", "changes": [{"rev": "1-y"}], "deleted": true}
            ],
            "last_seq": "2-b",
            "pending": 0
        }"#;

        let page: ChangesPage = serde_json::from_str(raw).unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.last_seq, "2-b");
        assert_eq!(page.pending, Some(0));
    }

    #[test]
    fn test_convert_row() {
        let item = ChangesTraversal::convert(json!({
            "seq": "3-c",
            "id": "doc3",
            "doc": {"_id": "doc3", "_rev": "2-z", "total": 12}
        }));

        let event = item.unwrap();
        assert_eq!(event.seq, "3-c");
        assert_eq!(event.id, "doc3");
        assert!(!event.deleted);
        assert!(event.doc.is_some());
    }

    #[test]
    fn test_convert_malformed_row_is_per_item_failure() {
        let item = ChangesTraversal::convert(json!({"id": "doc4"}));
        assert!(item.is_err());
    }

    #[tokio::test]
    async fn test_traversal_drains_buffered_page() {
        let client = make_client();
        let first = page(
            vec![
                json!({"seq": "1-a", "id": "doc1"}),
                json!({"seq": "2-b", "id": "doc2", "deleted": true}),
            ],
            "2-b",
            0,
        );

        let mut traversal = ChangesTraversal::new(client, make_opts(), first);

        assert_eq!(traversal.next_event().await.unwrap().unwrap().seq, "1-a");
        let second = traversal.next_event().await.unwrap().unwrap();
        assert_eq!(second.seq, "2-b");
        assert!(second.deleted);
        assert!(traversal.next_event().await.is_none());
        assert_eq!(traversal.end_seq().as_deref(), Some("2-b"));
    }

    #[tokio::test]
    async fn test_traversal_empty_page_reports_end_seq() {
        let client = make_client();
        let mut traversal = ChangesTraversal::new(client, make_opts(), page(vec![], "9-end", 0));

        assert!(traversal.next_event().await.is_none());
        assert_eq!(traversal.end_seq().as_deref(), Some("9-end"));
    }

    #[test]
    fn test_absorb_keeps_paging_while_pending() {
        let client = make_client();
        let mut traversal =
            ChangesTraversal::new(client, make_opts(), page(vec![json!({"seq": "1-a", "id": "d"})], "1-a", 40));

        assert!(!traversal.exhausted);
        assert_eq!(traversal.next_since, "1-a");

        traversal.absorb(page(vec![json!({"seq": "2-b", "id": "e"})], "2-b", 0));
        assert!(traversal.exhausted);
        assert_eq!(traversal.end_seq().as_deref(), Some("2-b"));
    }

    #[test]
    fn test_absorb_without_pending_stops_on_empty_page() {
        let client = make_client();
        let mut traversal = ChangesTraversal::new(
            client,
            make_opts(),
            ChangesPage {
                results: vec![json!({"seq": "1-a", "id": "d"})],
                last_seq: "1-a".into(),
                pending: None,
            },
        );
        assert!(!traversal.exhausted);

        traversal.absorb(ChangesPage {
            results: vec![],
            last_seq: "1-a".into(),
            pending: None,
        });
        assert!(traversal.exhausted);
    }
}
