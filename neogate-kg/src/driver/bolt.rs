//! `neo4rs` implementation of the driver seam

use super::{
    Credentials, DriverError, DriverErrorKind, DriverNode, DriverPath, DriverRecord,
    DriverRelationship, DriverResult, DriverSummary, DriverValue, GraphConnection, GraphDriver,
    GraphSession, Statement, WriteCounters,
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use neo4rs::summary::{Counters, ResultSummary};
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNode, BoltNull, BoltPath,
    BoltRelation, BoltString, BoltType, BoltUnboundedRelation, ConfigBuilder, Graph, Operation,
    Query, Row,
};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Driver backed by a `neo4rs` connection pool
#[derive(Debug, Clone)]
pub struct Neo4rsDriver {
    fetch_size: usize,
    max_connections: usize,
}

impl Default for Neo4rsDriver {
    fn default() -> Self {
        Self {
            fetch_size: 500,
            max_connections: 16,
        }
    }
}

impl Neo4rsDriver {
    /// Driver with the default pool settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Records fetched per round trip
    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    /// Pool size
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }
}

#[async_trait]
impl GraphDriver for Neo4rsDriver {
    type Connection = Neo4rsConnection;

    async fn open(
        &self,
        uri: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> DriverResult<Neo4rsConnection> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(credentials.user.as_str())
            .password(credentials.password.as_str())
            .fetch_size(self.fetch_size)
            .max_connections(self.max_connections)
            .connection_timeout(timeout)
            .build()
            .map_err(|e| DriverError::connection(format!("invalid configuration: {}", e)))?;

        // The pool dials lazily; the first query on it is the real connect.
        let graph = Graph::connect(config).map_err(|e| classify(&e, DriverErrorKind::Connection))?;

        debug!("Opened neo4rs pool for {}", uri);
        Ok(Neo4rsConnection { graph })
    }
}

/// Pooled connection to one address
pub struct Neo4rsConnection {
    graph: Graph,
}

#[async_trait]
impl GraphConnection for Neo4rsConnection {
    type Session = Neo4rsSession;

    async fn session(&self, database: &str) -> DriverResult<Neo4rsSession> {
        Ok(Neo4rsSession {
            graph: self.graph.clone(),
            database: database.to_string(),
        })
    }

    async fn close(&self) {
        // The pool closes its sockets when the last Graph clone is dropped.
        debug!("Releasing neo4rs pool");
    }
}

/// Session bound to one database
///
/// `neo4rs` checks a pooled connection out per query, so the session only
/// carries the pool handle and the database name.
pub struct Neo4rsSession {
    graph: Graph,
    database: String,
}

#[async_trait]
impl GraphSession for Neo4rsSession {
    async fn fetch(&mut self, statement: &Statement) -> DriverResult<Vec<DriverRecord>> {
        let mut stream = self
            .graph
            .execute_on(Operation::Read, self.database.as_str(), to_query(statement))
            .await
            .map_err(|e| classify(&e, DriverErrorKind::Query))?;

        let mut records = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| classify(&e, DriverErrorKind::Query))?
        {
            records.push(row_to_record(&row)?);
        }

        Ok(records)
    }

    async fn consume(&mut self, statement: &Statement) -> DriverResult<DriverSummary> {
        let summary = self
            .graph
            .run_on(self.database.as_str(), to_query(statement))
            .await
            .map_err(|e| classify(&e, DriverErrorKind::Query))?;

        Ok(summary_value(&summary))
    }

    async fn close(&mut self) {}
}

fn classify(error: &neo4rs::Error, fallback: DriverErrorKind) -> DriverError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    let kind = if lowered.contains("unauthorized") || lowered.contains("authentication") {
        DriverErrorKind::Authentication
    } else if lowered.contains("connection") || lowered.contains("io error") {
        DriverErrorKind::Connection
    } else {
        fallback
    };
    DriverError::new(kind, message)
}

fn to_query(statement: &Statement) -> Query {
    statement
        .params
        .iter()
        .fold(query(&statement.text), |q, (key, value)| {
            q.param(key, json_to_bolt(value))
        })
}

fn json_to_bolt(value: &JsonValue) -> BoltType {
    match value {
        JsonValue::Null => BoltType::Null(BoltNull),
        JsonValue::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(f64::NAN))),
        },
        JsonValue::String(s) => BoltType::String(BoltString::from(s.as_str())),
        JsonValue::Array(items) => {
            BoltType::from(items.iter().map(json_to_bolt).collect::<Vec<BoltType>>())
        }
        JsonValue::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, value) in map {
                bolt.put(BoltString::from(key.as_str()), json_to_bolt(value));
            }
            BoltType::Map(bolt)
        }
    }
}

fn counters_value(stats: &Counters) -> WriteCounters {
    WriteCounters {
        nodes_created: stats.nodes_created,
        nodes_deleted: stats.nodes_deleted,
        relationships_created: stats.relationships_created,
        relationships_deleted: stats.relationships_deleted,
        properties_set: stats.properties_set,
        labels_added: stats.labels_added,
        labels_removed: stats.labels_removed,
        indexes_added: stats.indexes_added,
        indexes_removed: stats.indexes_removed,
        constraints_added: stats.constraints_added,
        constraints_removed: stats.constraints_removed,
    }
}

fn summary_value(summary: &ResultSummary) -> DriverSummary {
    DriverSummary {
        counters: counters_value(summary.stats()),
        available_after: summary.available_after(),
        consumed_after: summary.consumed_after(),
    }
}

fn row_to_record(row: &Row) -> DriverResult<DriverRecord> {
    // Rows arrive as a keyed map without the server's field order; columns
    // are sorted by name so records are stable across runs.
    let mut keys: Vec<String> = row.keys().into_iter().map(|k| k.value.clone()).collect();
    keys.sort();

    let mut record = DriverRecord::default();
    for key in keys {
        let bolt = row
            .get::<BoltType>(&key)
            .map_err(|e| DriverError::new(DriverErrorKind::Protocol, e.to_string()))?;
        record.values.push(bolt_value(&bolt)?);
        record.keys.push(key);
    }

    Ok(record)
}

fn protocol(what: &str) -> DriverError {
    DriverError::new(
        DriverErrorKind::Protocol,
        format!("{} value out of range", what),
    )
}

fn bolt_value(value: &BoltType) -> DriverResult<DriverValue> {
    let converted = match value {
        BoltType::Null(_) => DriverValue::Null,
        BoltType::Boolean(b) => DriverValue::Boolean(b.value),
        BoltType::Integer(i) => DriverValue::Integer(i.value),
        BoltType::Float(f) => DriverValue::Float(f.value),
        BoltType::String(s) => DriverValue::String(s.value.clone()),
        BoltType::Bytes(b) => DriverValue::Bytes(b.value.to_vec()),
        BoltType::List(items) => DriverValue::List(
            items
                .iter()
                .map(bolt_value)
                .collect::<DriverResult<Vec<_>>>()?,
        ),
        BoltType::Map(map) => DriverValue::Map(properties(map)?),
        BoltType::Node(node) => DriverValue::Node(node_value(node)?),
        BoltType::Relation(rel) => DriverValue::Relationship(relation_value(rel)?),
        BoltType::UnboundedRelation(rel) => {
            // No endpoints outside a path
            DriverValue::Relationship(unbounded_value(rel, -1, -1)?)
        }
        BoltType::Path(path) => DriverValue::Path(path_value(path)?),
        BoltType::Point2D(p) => DriverValue::Other(format!(
            "point({{srid: {}, x: {}, y: {}}})",
            p.sr_id.value, p.x.value, p.y.value
        )),
        BoltType::Point3D(p) => DriverValue::Other(format!(
            "point({{srid: {}, x: {}, y: {}, z: {}}})",
            p.sr_id.value, p.x.value, p.y.value, p.z.value
        )),
        BoltType::Duration(d) => {
            let duration = Duration::from(d.clone());
            DriverValue::Other(format!("PT{}S", duration.as_secs_f64()))
        }
        BoltType::Date(d) => {
            let date = NaiveDate::try_from(d).map_err(|_| protocol("date"))?;
            DriverValue::Other(date.to_string())
        }
        BoltType::Time(t) => {
            let (time, offset): (NaiveTime, FixedOffset) = t.into();
            DriverValue::Other(format!("{}{}", time, offset))
        }
        BoltType::LocalTime(t) => DriverValue::Other(NaiveTime::from(t).to_string()),
        BoltType::DateTime(dt) => {
            let datetime =
                DateTime::<FixedOffset>::try_from(dt).map_err(|_| protocol("datetime"))?;
            DriverValue::Other(datetime.to_rfc3339())
        }
        BoltType::LocalDateTime(dt) => {
            let datetime =
                NaiveDateTime::try_from(dt).map_err(|_| protocol("localdatetime"))?;
            DriverValue::Other(datetime.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        BoltType::DateTimeZoneId(dt) => {
            let datetime =
                DateTime::<FixedOffset>::try_from(dt).map_err(|_| protocol("datetime"))?;
            DriverValue::Other(format!("{}[{}]", datetime.to_rfc3339(), dt.tz_id()))
        }
    };
    Ok(converted)
}

fn properties(map: &BoltMap) -> DriverResult<BTreeMap<String, DriverValue>> {
    map.value
        .iter()
        .map(|(k, v)| Ok((k.value.clone(), bolt_value(v)?)))
        .collect()
}

fn labels(list: &BoltList) -> Vec<String> {
    list.iter()
        .filter_map(|label| match label {
            BoltType::String(s) => Some(s.value.clone()),
            _ => None,
        })
        .collect()
}

fn node_value(node: &BoltNode) -> DriverResult<DriverNode> {
    Ok(DriverNode {
        id: node.id.value,
        labels: labels(&node.labels),
        properties: properties(&node.properties)?,
    })
}

fn relation_value(rel: &BoltRelation) -> DriverResult<DriverRelationship> {
    Ok(DriverRelationship {
        id: rel.id.value,
        rel_type: rel.typ.value.clone(),
        start_id: rel.start_node_id.value,
        end_id: rel.end_node_id.value,
        properties: properties(&rel.properties)?,
    })
}

fn unbounded_value(
    rel: &BoltUnboundedRelation,
    start_id: i64,
    end_id: i64,
) -> DriverResult<DriverRelationship> {
    Ok(DriverRelationship {
        id: rel.id.value,
        rel_type: rel.typ.value.clone(),
        start_id,
        end_id,
        properties: properties(&rel.properties)?,
    })
}

/// Walk a path's index sequence
///
/// Indices come in `(relationship, node)` pairs. A relationship index is
/// 1-based and negative when the relationship points against the walk; a
/// node index points into the path's distinct nodes.
fn path_value(path: &BoltPath) -> DriverResult<DriverPath> {
    let distinct = path.nodes();
    let rels = path.rels();
    let indices: Vec<i64> = path.indices().into_iter().map(|i| i.value).collect();

    if indices.is_empty() {
        // Segments without indices are taken in traversal order.
        let nodes = distinct
            .iter()
            .map(node_value)
            .collect::<DriverResult<Vec<_>>>()?;
        let relationships = rels
            .iter()
            .enumerate()
            .map(|(i, rel)| {
                let start = nodes.get(i).map(|n| n.id).unwrap_or(-1);
                let end = nodes.get(i + 1).map(|n| n.id).unwrap_or(-1);
                unbounded_value(rel, start, end)
            })
            .collect::<DriverResult<Vec<_>>>()?;
        return Ok(DriverPath {
            nodes,
            relationships,
        });
    }

    let malformed = || DriverError::new(DriverErrorKind::Protocol, "malformed path indices");

    let first = distinct.first().ok_or_else(malformed)?;
    let mut nodes = vec![node_value(first)?];
    let mut relationships = Vec::with_capacity(indices.len() / 2);
    let mut previous = first;

    for pair in indices.chunks(2) {
        let [rel_index, node_index] = pair else {
            return Err(malformed());
        };
        let next = usize::try_from(*node_index)
            .ok()
            .and_then(|i| distinct.get(i))
            .ok_or_else(malformed)?;
        let rel = usize::try_from(rel_index.unsigned_abs())
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| rels.get(i))
            .ok_or_else(malformed)?;

        let (start, end) = if *rel_index > 0 {
            (previous.id.value, next.id.value)
        } else {
            (next.id.value, previous.id.value)
        };
        relationships.push(unbounded_value(rel, start, end)?);
        nodes.push(node_value(next)?);
        previous = next;
    }

    Ok(DriverPath {
        nodes,
        relationships,
    })
}
