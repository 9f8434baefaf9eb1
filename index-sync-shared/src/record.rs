//! Source records read from the primary store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw record streamed from the primary store.
///
/// Records are JSON objects. The `_id` field identifies the record and becomes
/// the document id in the search index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create a record from a JSON object.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build a record from any JSON value. Returns `None` if the value is not an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// The record identifier rendered as a string.
    ///
    /// Accepts plain strings, numbers and extended JSON object ids (`{"$oid": "..."}`).
    pub fn id(&self) -> Option<String> {
        match self.0.get("_id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            Value::Object(inner) => inner
                .get("$oid")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }

    /// Get a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Borrow the underlying JSON object.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the record, returning the underlying JSON object.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_variants() {
        let record = Record::from_value(json!({ "_id": "abc" })).unwrap();
        assert_eq!(record.id(), Some("abc".to_string()));

        let record = Record::from_value(json!({ "_id": 42 })).unwrap();
        assert_eq!(record.id(), Some("42".to_string()));

        let record =
            Record::from_value(json!({ "_id": { "$oid": "507f1f77bcf86cd799439011" } })).unwrap();
        assert_eq!(record.id(), Some("507f1f77bcf86cd799439011".to_string()));
    }

    #[test]
    fn test_missing_id() {
        let record = Record::from_value(json!({ "name": "no id" })).unwrap();
        assert!(record.id().is_none());
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Record::from_value(json!([1, 2, 3])).is_none());
        assert!(Record::from_value(json!("text")).is_none());
    }
}
