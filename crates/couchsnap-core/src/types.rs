use serde::{Deserialize, Serialize};

/// A change event derived from the database's changes feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Opaque position of this event in the feed's total order.
    pub seq: String,
    /// Id of the document the event concerns.
    pub id: String,
    /// Whether this event is a deletion tombstone.
    #[serde(default)]
    pub deleted: bool,
    /// Full document body, present when the feed was opened with
    /// `include_docs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<serde_json::Value>,
}

impl ChangeEvent {
    /// The document as it should appear in a snapshot: the body with the
    /// source revision marker removed.
    pub fn export_doc(&self) -> Option<serde_json::Value> {
        let mut doc = self.doc.clone()?;
        if let Some(obj) = doc.as_object_mut() {
            obj.remove("_rev");
        }
        Some(doc)
    }
}
