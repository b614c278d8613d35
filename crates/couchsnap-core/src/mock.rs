use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::feed::{ChangeFeed, FeedItem, FeedOptions, FeedTraversal};
use crate::types::ChangeEvent;

/// A scripted changes feed for testing.
#[derive(Clone, Default)]
pub struct MockFeed {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Items every traversal yields, in order.
    items: Vec<MockItem>,
    /// End-of-range marker a traversal reports once drained.
    end_seq: Option<String>,
    /// If set, `open` fails with this message.
    fail_open: Option<String>,
    /// Options recorded from every `open` call.
    opens: Vec<FeedOptions>,
}

#[derive(Clone)]
enum MockItem {
    Event(ChangeEvent),
    Failure(String),
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a change event for the next traversal.
    pub fn push_event(&self, event: ChangeEvent) {
        self.state.lock().unwrap().items.push(MockItem::Event(event));
    }

    /// Queue a per-item failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .items
            .push(MockItem::Failure(message.into()));
    }

    /// Set the end-of-range marker a drained traversal reports.
    pub fn set_end_seq(&self, seq: impl Into<String>) {
        self.state.lock().unwrap().end_seq = Some(seq.into());
    }

    /// Make every `open` call fail.
    pub fn fail_open(&self, message: impl Into<String>) {
        self.state.lock().unwrap().fail_open = Some(message.into());
    }

    /// Options from every traversal opened so far.
    pub fn opens(&self) -> Vec<FeedOptions> {
        self.state.lock().unwrap().opens.clone()
    }
}

impl ChangeFeed for MockFeed {
    type Traversal = MockTraversal;

    fn open(&self, opts: FeedOptions) -> impl Future<Output = Result<MockTraversal>> + Send {
        let state = self.state.clone();
        async move {
            let mut state = state.lock().unwrap();
            state.opens.push(opts);

            if let Some(ref message) = state.fail_open {
                return Err(Error::Feed(message.clone()));
            }

            Ok(MockTraversal {
                items: state.items.iter().cloned().collect(),
                end_seq: state.end_seq.clone(),
            })
        }
    }
}

/// Traversal over a scripted item list.
pub struct MockTraversal {
    items: VecDeque<MockItem>,
    end_seq: Option<String>,
}

impl FeedTraversal for MockTraversal {
    fn next_event(&mut self) -> impl Future<Output = Option<FeedItem>> + Send {
        let next = self.items.pop_front().map(|item| match item {
            MockItem::Event(event) => Ok(event),
            MockItem::Failure(message) => Err(Error::Feed(message)),
        });
        async move { next }
    }

    fn end_seq(&self) -> Option<String> {
        self.end_seq.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_event(seq: &str, id: &str) -> ChangeEvent {
        ChangeEvent {
            seq: seq.into(),
            id: id.into(),
            deleted: false,
            doc: Some(json!({"_id": id})),
        }
    }

    #[tokio::test]
    async fn test_mock_feed_yields_items_in_order() {
        let feed = MockFeed::new();
        feed.push_event(make_event("1-a", "doc1"));
        feed.push_failure("boom");
        feed.push_event(make_event("3-c", "doc3"));

        let mut traversal = feed
            .open(FeedOptions {
                database: "orders".into(),
                since: "0".into(),
                include_docs: true,
            })
            .await
            .unwrap();

        assert_eq!(traversal.next_event().await.unwrap().unwrap().seq, "1-a");
        assert!(traversal.next_event().await.unwrap().is_err());
        assert_eq!(traversal.next_event().await.unwrap().unwrap().seq, "3-c");
        assert!(traversal.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_mock_feed_records_opens() {
        let feed = MockFeed::new();
        let opts = FeedOptions {
            database: "orders".into(),
            since: "42-x".into(),
            include_docs: true,
        };

        feed.open(opts.clone()).await.unwrap();

        let opens = feed.opens();
        assert_eq!(opens.len(), 1);
        assert_eq!(opens[0], opts);
    }

    #[tokio::test]
    async fn test_mock_feed_fail_open() {
        let feed = MockFeed::new();
        feed.fail_open("db not found");

        let result = feed
            .open(FeedOptions {
                database: "missing".into(),
                since: "0".into(),
                include_docs: true,
            })
            .await;

        assert!(result.is_err());
        assert_eq!(feed.opens().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_feed_end_seq() {
        let feed = MockFeed::new();
        feed.set_end_seq("99-end");

        let traversal = feed
            .open(FeedOptions {
                database: "orders".into(),
                since: "0".into(),
                include_docs: true,
            })
            .await
            .unwrap();

        assert_eq!(traversal.end_seq().as_deref(), Some("99-end"));
    }
}
