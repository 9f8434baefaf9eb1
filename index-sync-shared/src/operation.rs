//! Bulk index operations.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// The kind of bulk action. Synchronization only ever upserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Index (create or replace) the document.
    Index,
}

impl OperationKind {
    /// The action name used in the bulk request body.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Index => "index",
        }
    }
}

/// The action line of a bulk operation: target index, document id and kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionHeader {
    /// Target index name.
    pub index: String,
    /// Target document id.
    pub id: String,
    /// Operation kind.
    pub kind: OperationKind,
}

impl ActionHeader {
    /// Create an index (upsert) header.
    pub fn index(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
            kind: OperationKind::Index,
        }
    }

    /// Render the header as a bulk action line, e.g. `{"index": {"_index": "cats", "_id": "1"}}`.
    pub fn to_json(&self) -> Value {
        let mut action = Map::new();
        action.insert(
            self.kind.as_str().to_string(),
            json!({
                "_index": self.index,
                "_id": self.id,
            }),
        );
        Value::Object(action)
    }
}

/// One unit of work in a bulk request: an action header plus a document body.
///
/// Operations are opaque to the batch accumulator; only the transport looks inside.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOperation {
    /// The action line.
    pub header: ActionHeader,
    /// The serialized document.
    pub body: Value,
}

impl IndexOperation {
    /// Create an index operation for a document.
    pub fn index(index: impl Into<String>, id: impl Into<String>, body: Value) -> Self {
        Self {
            header: ActionHeader::index(index, id),
            body,
        }
    }
}
