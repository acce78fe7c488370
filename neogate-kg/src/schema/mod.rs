//! Schema introspection
//!
//! This module captures what a database contains: labels, relationship
//! types, the server's schema visualization and per-label-set node counts.

pub mod inspector;
pub mod snapshot;

pub use inspector::{
    SchemaInspector, LABELS_QUERY, NODE_COUNTS_QUERY, RELATIONSHIP_TYPES_QUERY,
    VISUALIZATION_QUERY,
};
pub use snapshot::{LabelCount, SchemaSnapshot};
