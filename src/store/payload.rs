//! Chunk metadata and its Qdrant payload encoding

use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{ListValue, Struct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Payload key holding the chunk text in the vector store
pub const TEXT_KEY: &str = "text";

/// Metadata stored with each chunk in both stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Catalog source id of the owning file
    pub file_id: String,

    /// File name as registered in the catalog
    pub file_name: String,

    /// Page label, when the loader knows pages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_label: Option<String>,

    /// Owner of the file, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Chunk index within the file
    pub chunk_index: i64,
}

impl ChunkMetadata {
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Option<Self> {
        serde_json::from_value(Value::Object(map.clone())).ok()
    }
}

/// Convert a JSON metadata map (plus chunk text) to a Qdrant payload
pub fn to_qdrant_payload(text: &str, metadata: &Map<String, Value>) -> HashMap<String, QdrantValue> {
    let mut map: HashMap<String, QdrantValue> = metadata
        .iter()
        .map(|(k, v)| (k.clone(), json_to_qdrant_value(v)))
        .collect();
    map.insert(TEXT_KEY.to_string(), string_to_qdrant(text));
    map
}

/// Split a Qdrant payload into chunk text and metadata
pub fn from_qdrant_payload(payload: HashMap<String, QdrantValue>) -> (String, Map<String, Value>) {
    let mut metadata: Map<String, Value> = payload
        .into_iter()
        .map(|(k, v)| (k, json_from_qdrant_value(v)))
        .collect();
    let text = match metadata.remove(TEXT_KEY) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };
    (text, metadata)
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::StringValue(s.to_string())),
    }
}

/// Convert serde_json Value to Qdrant value
pub fn json_to_qdrant_value(v: &Value) -> QdrantValue {
    let kind = match v {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_to_qdrant_value).collect(),
        }),
        Value::Object(fields) => Kind::StructValue(Struct {
            fields: fields
                .iter()
                .map(|(k, v)| (k.clone(), json_to_qdrant_value(v)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

/// Convert Qdrant value to serde_json Value
pub fn json_from_qdrant_value(v: QdrantValue) -> Value {
    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_map_skips_missing_fields() {
        let meta = ChunkMetadata {
            file_id: "source-123".to_string(),
            file_name: "report.pdf".to_string(),
            page_label: Some("2".to_string()),
            user: None,
            chunk_index: 4,
        };

        let map = meta.to_map();
        assert_eq!(map["file_name"], "report.pdf");
        assert!(!map.contains_key("user"));
        assert_eq!(ChunkMetadata::from_map(&map), Some(meta));
    }

    #[test]
    fn test_payload_carries_text_separately() {
        let meta = ChunkMetadata {
            file_id: "f".to_string(),
            file_name: "a.txt".to_string(),
            page_label: None,
            user: Some("alice".to_string()),
            chunk_index: 0,
        };

        let payload = to_qdrant_payload("chunk body", &meta.to_map());
        assert!(payload.contains_key(TEXT_KEY));

        let (text, metadata) = from_qdrant_payload(payload);
        assert_eq!(text, "chunk body");
        assert_eq!(metadata["user"], "alice");
        assert_eq!(metadata["chunk_index"], 0);
        assert!(!metadata.contains_key(TEXT_KEY));
    }
}
