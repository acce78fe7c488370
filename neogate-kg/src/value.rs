//! Portable result values
//!
//! [`NormalizedValue`] is what read queries hand back to callers: plain JSON
//! scalars plus graph entities rendered as
//!
//! ```text
//! node:          {"identity": 4, "labels": ["Person"], "properties": {...}}
//! relationship:  {"identity": 9, "type": "KNOWS", "start": 4, "end": 5, "properties": {...}}
//! path:          {"nodes": [...], "relationships": [...]}
//! ```

use crate::driver::{DriverNode, DriverPath, DriverRecord, DriverRelationship, DriverValue};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Number, Value as JsonValue};
use std::collections::BTreeMap;

/// Node with its identity, labels and properties
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedNode {
    pub identity: i64,
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, NormalizedValue>,
}

/// Relationship with its endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEdge {
    pub identity: i64,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub start: i64,
    pub end: i64,
    pub properties: BTreeMap<String, NormalizedValue>,
}

/// Path as ordered nodes and relationships
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPath {
    pub nodes: Vec<NormalizedNode>,
    pub relationships: Vec<NormalizedEdge>,
}

/// A result value, independent of the driver that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedValue {
    Scalar(JsonValue),
    Node(NormalizedNode),
    Edge(NormalizedEdge),
    Path(NormalizedPath),
    List(Vec<NormalizedValue>),
    Map(BTreeMap<String, NormalizedValue>),
}

impl NormalizedValue {
    /// Convert to a plain JSON value
    pub fn to_json(&self) -> JsonValue {
        // Serializing this type into a Value cannot fail: every key is a string.
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    /// String content, if this is a string scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NormalizedValue::Scalar(JsonValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an integer scalar
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NormalizedValue::Scalar(JsonValue::Number(n)) => n.as_i64(),
            _ => None,
        }
    }

    /// Items, if this is a list
    pub fn as_list(&self) -> Option<&[NormalizedValue]> {
        match self {
            NormalizedValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<DriverNode> for NormalizedNode {
    fn from(node: DriverNode) -> Self {
        Self {
            identity: node.id,
            labels: node.labels,
            properties: normalize_map(node.properties),
        }
    }
}

impl From<DriverRelationship> for NormalizedEdge {
    fn from(rel: DriverRelationship) -> Self {
        Self {
            identity: rel.id,
            rel_type: rel.rel_type,
            start: rel.start_id,
            end: rel.end_id,
            properties: normalize_map(rel.properties),
        }
    }
}

impl From<DriverPath> for NormalizedPath {
    fn from(path: DriverPath) -> Self {
        Self {
            nodes: path.nodes.into_iter().map(NormalizedNode::from).collect(),
            relationships: path
                .relationships
                .into_iter()
                .map(NormalizedEdge::from)
                .collect(),
        }
    }
}

impl From<DriverValue> for NormalizedValue {
    fn from(value: DriverValue) -> Self {
        match value {
            DriverValue::Node(node) => NormalizedValue::Node(node.into()),
            DriverValue::Relationship(rel) => NormalizedValue::Edge(rel.into()),
            DriverValue::Path(path) => NormalizedValue::Path(path.into()),
            DriverValue::List(items) => {
                NormalizedValue::List(items.into_iter().map(NormalizedValue::from).collect())
            }
            DriverValue::Map(map) => NormalizedValue::Map(normalize_map(map)),
            DriverValue::Null => NormalizedValue::Scalar(JsonValue::Null),
            DriverValue::Boolean(b) => NormalizedValue::Scalar(JsonValue::Bool(b)),
            DriverValue::Integer(i) => NormalizedValue::Scalar(JsonValue::from(i)),
            // NaN and infinities have no JSON form
            DriverValue::Float(f) => NormalizedValue::Scalar(
                Number::from_f64(f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
            ),
            DriverValue::String(s) | DriverValue::Other(s) => {
                NormalizedValue::Scalar(JsonValue::String(s))
            }
            DriverValue::Bytes(bytes) => NormalizedValue::Scalar(JsonValue::from(bytes)),
        }
    }
}

impl From<JsonValue> for NormalizedValue {
    fn from(value: JsonValue) -> Self {
        NormalizedValue::Scalar(value)
    }
}

fn normalize_map(map: BTreeMap<String, DriverValue>) -> BTreeMap<String, NormalizedValue> {
    map.into_iter()
        .map(|(k, v)| (k, NormalizedValue::from(v)))
        .collect()
}

/// One normalized result row, keeping the server's column order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<NormalizedValue>,
}

impl Record {
    /// Build a record from `(column, value)` pairs
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, NormalizedValue)>,
        K: Into<String>,
    {
        let (columns, values) = pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self { columns, values }
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value of a column
    pub fn get(&self, column: &str) -> Option<&NormalizedValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// `(column, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NormalizedValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the record has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Convert to a JSON object
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

impl From<DriverRecord> for Record {
    fn from(record: DriverRecord) -> Self {
        Self {
            columns: record.keys,
            values: record.values.into_iter().map(NormalizedValue::from).collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}
