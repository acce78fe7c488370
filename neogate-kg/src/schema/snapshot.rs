//! Schema snapshot types

use crate::value::Record;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Number of nodes carrying one exact set of labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub labels: Vec<String>,
    pub count: i64,
}

/// Point-in-time description of a database's schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSnapshot {
    /// Node labels, sorted
    pub labels: Vec<String>,
    /// Relationship types, sorted
    pub relationship_types: Vec<String>,
    /// Raw records of `db.schema.visualization()`
    pub visualization: Vec<Record>,
    /// Node counts per label set, largest first
    pub node_counts: Vec<LabelCount>,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    /// A snapshot with every section empty
    pub fn empty() -> Self {
        Self {
            labels: Vec::new(),
            relationship_types: Vec::new(),
            visualization: Vec::new(),
            node_counts: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    /// Whether every section is empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
            && self.relationship_types.is_empty()
            && self.visualization.is_empty()
            && self.node_counts.is_empty()
    }

    /// Total nodes across all label sets
    pub fn total_nodes(&self) -> i64 {
        self.node_counts.iter().map(|c| c.count).sum()
    }
}

impl Default for SchemaSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
