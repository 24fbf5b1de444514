//! Primary key and per-document properties.
//!
//! Every document has exactly one partition-key component `pk` and one
//! identifier `id`; together `(pk, id)` is the primary key and is never
//! absent from an operation that targets a specific document.

use serde::Serialize;

use crate::core::error::{StoreError, StoreResult};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Key {
    pub pk: String,
    pub id: String,
}

impl Key {
    pub fn new(pk: impl Into<String>, id: impl Into<String>) -> Self {
        Key {
            pk: pk.into(),
            id: id.into(),
        }
    }

    /// Extracts `(pk, id)` from a key-shaped value, e.g. `{"pk": "...",
    /// "id": "..."}`. Used both for `GET KEY {...}` and for locating the
    /// key fields inside a document passed to `put`.
    pub fn from_value(v: &Value) -> StoreResult<Self> {
        let pk = v
            .get_field("pk")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::bad_request("key is missing string field 'pk'"))?;
        let id = v
            .get_field("id")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::bad_request("key is missing string field 'id'"))?;
        Ok(Key::new(pk, id))
    }

    pub fn as_value(&self) -> Value {
        let mut map = indexmap::IndexMap::new();
        map.insert("pk".to_string(), Value::String(self.pk.clone()));
        map.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(map)
    }
}

/// Opaque per-document metadata returned alongside a value. `etag` changes
/// on every successful mutation and backs optimistic-concurrency `where`
/// clauses (`$etag = '...'`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Properties {
    pub etag: String,
}

impl Properties {
    pub fn new(etag: impl Into<String>) -> Self {
        Properties { etag: etag.into() }
    }
}

/// A stored document as returned to callers: key, value (when requested or
/// applicable to the verb), and properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub key: Key,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub properties: Properties,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_from_value_reads_pk_and_id() {
        let v: Value = json!({"pk": "pk00", "id": "3", "other": 1}).into();
        let k = Key::from_value(&v).unwrap();
        assert_eq!(k, Key::new("pk00", "3"));
    }

    #[test]
    fn key_from_value_rejects_missing_fields() {
        let v: Value = json!({"pk": "pk00"}).into();
        assert!(Key::from_value(&v).is_err());
    }
}
