pub mod checkpoint;
pub mod cursor;
pub mod error;
pub mod feed;
pub mod mock;
pub mod snapshot;
pub mod types;
pub mod writer;

pub use checkpoint::RunMeta;
pub use error::{Error, Result};
pub use feed::{ChangeFeed, FeedItem, FeedOptions, FeedTraversal};
pub use mock::{MockFeed, MockTraversal};
pub use snapshot::{sanitize_database_name, RunReport, SnapshotConfig, SnapshotRun};
pub use types::ChangeEvent;
pub use writer::SnapshotWriter;
