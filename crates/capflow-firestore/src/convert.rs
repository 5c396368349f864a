//! Mapping between serde models and Firestore documents.
//!
//! Models are serialized to JSON first and the JSON tree is mapped onto
//! Firestore values. Top-level timestamp fields are stored as
//! `timestampValue` so they can be range-queried.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number};

use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{ArrayValue, Document, MapValue, Value};

/// Top-level fields written as Firestore timestamps.
pub const TIMESTAMP_FIELDS: &[&str] = &["createdAt", "updatedAt", "editedAt"];

/// Convert a JSON value into a Firestore value.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::NullValue(()),
        serde_json::Value::Bool(b) => Value::BooleanValue(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::IntegerValue(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Value::IntegerValue(u.to_string())
            } else {
                Value::DoubleValue(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::StringValue(s.clone()),
        serde_json::Value::Array(items) => Value::ArrayValue(ArrayValue {
            values: Some(items.iter().map(json_to_value).collect()),
        }),
        serde_json::Value::Object(map) => Value::MapValue(MapValue {
            fields: Some(map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect()),
        }),
    }
}

/// Convert a Firestore value back into JSON.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::NullValue(()) => serde_json::Value::Null,
        Value::BooleanValue(b) => serde_json::Value::Bool(*b),
        Value::IntegerValue(s) => s
            .parse::<i64>()
            .map(|i| serde_json::Value::Number(i.into()))
            .unwrap_or_else(|_| serde_json::Value::String(s.clone())),
        Value::DoubleValue(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::TimestampValue(s)
        | Value::StringValue(s)
        | Value::BytesValue(s)
        | Value::ReferenceValue(s) => serde_json::Value::String(s.clone()),
        Value::ArrayValue(array) => serde_json::Value::Array(
            array
                .values
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(value_to_json)
                .collect(),
        ),
        Value::MapValue(map) => {
            let mut object = Map::new();
            if let Some(fields) = &map.fields {
                for (k, v) in fields {
                    object.insert(k.clone(), value_to_json(v));
                }
            }
            serde_json::Value::Object(object)
        }
    }
}

/// Serialize a model into document fields.
pub fn to_fields<T: Serialize>(model: &T) -> FirestoreResult<HashMap<String, Value>> {
    match serde_json::to_value(model)? {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, json)| {
                let value = match (&json, TIMESTAMP_FIELDS.contains(&key.as_str())) {
                    (serde_json::Value::String(ts), true) => Value::TimestampValue(ts.clone()),
                    _ => json_to_value(&json),
                };
                (key, value)
            })
            .collect()),
        other => Err(FirestoreError::serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Keep only the fields named in `mask`.
pub fn masked(mut fields: HashMap<String, Value>, mask: &[&str]) -> HashMap<String, Value> {
    fields.retain(|k, _| mask.contains(&k.as_str()));
    fields
}

/// Deserialize a model from a document.
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> FirestoreResult<T> {
    let mut object = Map::new();
    if let Some(fields) = &doc.fields {
        for (k, v) in fields {
            object.insert(k.clone(), value_to_json(v));
        }
    }
    serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
        FirestoreError::serialization(format!(
            "failed to decode {}: {}",
            doc.name.as_deref().unwrap_or("document"),
            e
        ))
    })
}
