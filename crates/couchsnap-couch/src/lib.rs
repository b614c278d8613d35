mod changes;
mod config;
mod error;

pub use changes::{ChangesTraversal, CouchClient};
pub use config::ServiceConfig;
pub use error::{CouchError, CouchResult};
