//! Record-to-document serialization.
//!
//! Turns a raw source record into the document body of an index operation,
//! keeping only the fields named by the field mapping.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::SyncError;
use index_sync_shared::Record;

/// Field mapping of the target index.
///
/// Mirrors the `properties` section of a search-engine mapping. A property may
/// carry nested `properties` (objects and arrays of objects) or a constant
/// `value` written regardless of the record's content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(default)]
    pub properties: BTreeMap<String, FieldProperty>,
}

/// One mapped field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldProperty {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, FieldProperty>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldMapping {
    /// Parse a mapping from its JSON form, e.g. `{"properties": {"name": {"type": "text"}}}`.
    pub fn from_value(value: Value) -> Result<Self, SyncError> {
        serde_json::from_value(value)
            .map_err(|e| SyncError::config(format!("invalid field mapping: {}", e)))
    }

    /// Untyped mapping of the given top-level fields.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            properties: fields
                .into_iter()
                .map(|field| (field.into(), FieldProperty::default()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Turns a record into a document body.
///
/// Returning `None` means there is nothing to send for this record.
pub trait Serializer: Send + Sync {
    fn serialize(&self, record: &Record, mapping: &FieldMapping) -> Option<Value>;
}

/// Default serializer driven by the field mapping.
///
/// - An empty mapping sends every field except `_id`.
/// - Mapped fields missing from the record are left out; constant values are always written.
/// - Nested mappings recurse into objects and arrays of objects.
/// - Extended JSON wrappers (`$oid`, `$date`) are unwrapped into plain strings.
/// - An object with none of the mapped fields becomes `{}`, so stale indexed
///   fields are cleared on upsert.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingSerializer;

impl Serializer for MappingSerializer {
    fn serialize(&self, record: &Record, mapping: &FieldMapping) -> Option<Value> {
        if mapping.is_empty() {
            let body: Map<String, Value> = record
                .fields()
                .iter()
                .filter(|(field, _)| field.as_str() != "_id")
                .map(|(field, value)| (field.clone(), render(value)))
                .collect();
            return Some(Value::Object(body));
        }

        Some(Value::Object(serialize_object(
            record.fields(),
            &mapping.properties,
        )))
    }
}

fn serialize_object(
    object: &Map<String, Value>,
    properties: &BTreeMap<String, FieldProperty>,
) -> Map<String, Value> {
    let mut serialized = Map::new();

    for (field, property) in properties {
        let value = match &property.value {
            Some(constant) => Some(constant.clone()),
            None => object
                .get(field)
                .and_then(|value| serialize_value(value, property)),
        };

        if let Some(value) = value {
            serialized.insert(field.clone(), value);
        }
    }

    serialized
}

fn serialize_value(value: &Value, property: &FieldProperty) -> Option<Value> {
    let Some(nested) = &property.properties else {
        return Some(render(value));
    };

    match value {
        Value::Object(object) if !is_extended_json(object) => {
            Some(Value::Object(serialize_object(object, nested)))
        }
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(object) if !is_extended_json(object) => {
                        Value::Object(serialize_object(object, nested))
                    }
                    other => render(other),
                })
                .collect(),
        )),
        other => Some(render(other)),
    }
}

fn is_extended_json(object: &Map<String, Value>) -> bool {
    object.len() == 1 && (object.contains_key("$oid") || object.contains_key("$date"))
}

/// Unwrap extended JSON; leave everything else as is.
fn render(value: &Value) -> Value {
    match value {
        Value::Object(object) if is_extended_json(object) => {
            match (object.get("$oid"), object.get("$date")) {
                (Some(oid), _) => oid.clone(),
                (None, Some(date)) => render_date(date),
                (None, None) => value.clone(),
            }
        }
        Value::Object(object) => Value::Object(
            object
                .iter()
                .map(|(field, value)| (field.clone(), render(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(render).collect()),
        other => other.clone(),
    }
}

/// Dates become RFC 3339 strings with millisecond precision.
fn render_date(date: &Value) -> Value {
    let millis = match date {
        Value::Number(n) => n.as_i64(),
        Value::Object(inner) => inner
            .get("$numberLong")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok()),
        _ => None,
    };

    match millis.and_then(DateTime::from_timestamp_millis) {
        Some(date) => Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => date.clone(),
    }
}
