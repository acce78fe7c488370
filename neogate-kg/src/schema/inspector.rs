//! Schema inspection through the query executor

use crate::driver::GraphDriver;
use crate::error::{GateError, Result};
use crate::executor::QueryExecutor;
use crate::schema::snapshot::{LabelCount, SchemaSnapshot};
use crate::value::{NormalizedValue, Record};
use chrono::Utc;
use serde_json::Map;
use tracing::{debug, error};

pub const LABELS_QUERY: &str = "CALL db.labels() YIELD label RETURN label ORDER BY label";

pub const RELATIONSHIP_TYPES_QUERY: &str = "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType ORDER BY relationshipType";

pub const VISUALIZATION_QUERY: &str = "CALL db.schema.visualization()";

pub const NODE_COUNTS_QUERY: &str =
    "MATCH (n) RETURN labels(n) AS labels, count(*) AS count ORDER BY count DESC";

/// Collects a [`SchemaSnapshot`]
pub struct SchemaInspector<D: GraphDriver> {
    executor: QueryExecutor<D>,
}

impl<D: GraphDriver> SchemaInspector<D> {
    /// Create an inspector over an executor
    pub fn new(executor: QueryExecutor<D>) -> Self {
        Self { executor }
    }

    /// Take a snapshot, degrading to an empty one on any failure
    ///
    /// The failure is logged at error level.
    ///
    /// # Example
    /// ```no_run
    /// use neogate_kg::{
    ///     AddressResolver, ConnectionConfig, ConnectionManager, Neo4rsDriver, QueryExecutor,
    ///     SchemaInspector, SharedConfig, SystemProbe,
    /// };
    /// use std::sync::Arc;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let config = SharedConfig::new(ConnectionConfig::load()?);
    ///     let resolver = AddressResolver::new(Arc::new(SystemProbe::new()));
    ///     let manager = Arc::new(ConnectionManager::new(config, resolver, Neo4rsDriver::new()));
    ///
    ///     let inspector = SchemaInspector::new(QueryExecutor::new(manager));
    ///     let snapshot = inspector.snapshot().await;
    ///     println!("Labels: {:?}", snapshot.labels);
    ///     Ok(())
    /// }
    /// ```
    pub async fn snapshot(&self) -> SchemaSnapshot {
        match self.try_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to get schema: {}", e);
                SchemaSnapshot::empty()
            }
        }
    }

    /// Take a snapshot, returning the first failure
    pub async fn try_snapshot(&self) -> Result<SchemaSnapshot> {
        let labels = self
            .read(LABELS_QUERY)
            .await?
            .iter()
            .map(|record| string_column(record, "label"))
            .collect::<Result<Vec<_>>>()?;

        let relationship_types = self
            .read(RELATIONSHIP_TYPES_QUERY)
            .await?
            .iter()
            .map(|record| string_column(record, "relationshipType"))
            .collect::<Result<Vec<_>>>()?;

        let visualization = self.read(VISUALIZATION_QUERY).await?;

        let node_counts = self
            .read(NODE_COUNTS_QUERY)
            .await?
            .iter()
            .map(label_count)
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Schema snapshot: {} label(s), {} relationship type(s)",
            labels.len(),
            relationship_types.len()
        );

        Ok(SchemaSnapshot {
            labels,
            relationship_types,
            visualization,
            node_counts,
            captured_at: Utc::now(),
        })
    }

    async fn read(&self, query: &str) -> Result<Vec<Record>> {
        self.executor.execute_read(query, Map::new()).await
    }
}

fn unexpected(column: &str, record: &Record) -> GateError {
    GateError::SerializationError(format!(
        "unexpected value for column '{}' in {}",
        column,
        record.to_json()
    ))
}

fn string_column(record: &Record, column: &str) -> Result<String> {
    record
        .get(column)
        .and_then(NormalizedValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| unexpected(column, record))
}

fn label_count(record: &Record) -> Result<LabelCount> {
    let labels = record
        .get("labels")
        .and_then(NormalizedValue::as_list)
        .ok_or_else(|| unexpected("labels", record))?
        .iter()
        .map(|label| {
            label
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| unexpected("labels", record))
        })
        .collect::<Result<Vec<_>>>()?;

    let count = record
        .get("count")
        .and_then(NormalizedValue::as_i64)
        .ok_or_else(|| unexpected("count", record))?;

    Ok(LabelCount { labels, count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, SharedConfig};
    use crate::connection::ConnectionManager;
    use crate::driver::{DriverError, DriverRecord, DriverValue, ScriptedDriver, ScriptedResponse};
    use crate::environment::StaticProbe;
    use crate::resolver::AddressResolver;
    use std::sync::Arc;

    fn inspector(driver: ScriptedDriver) -> SchemaInspector<ScriptedDriver> {
        let resolver = AddressResolver::new(Arc::new(StaticProbe::native()));
        let manager = ConnectionManager::new(
            SharedConfig::new(ConnectionConfig::default()),
            resolver,
            driver,
        );
        SchemaInspector::new(QueryExecutor::new(Arc::new(manager)))
    }

    fn strings(column: &str, values: &[&str]) -> ScriptedResponse {
        ScriptedResponse::Records(
            values
                .iter()
                .map(|v| DriverRecord::from_pairs([(column, DriverValue::String(v.to_string()))]))
                .collect(),
        )
    }

    fn populated() -> ScriptedDriver {
        ScriptedDriver::new()
            .respond(LABELS_QUERY, strings("label", &["Movie", "Person"]))
            .respond(
                RELATIONSHIP_TYPES_QUERY,
                strings("relationshipType", &["ACTED_IN"]),
            )
            .respond(
                NODE_COUNTS_QUERY,
                ScriptedResponse::Records(vec![
                    DriverRecord::from_pairs([
                        (
                            "labels",
                            DriverValue::List(vec![DriverValue::String("Person".into())]),
                        ),
                        ("count", DriverValue::Integer(2)),
                    ]),
                    DriverRecord::from_pairs([
                        ("labels", DriverValue::List(vec![])),
                        ("count", DriverValue::Integer(1)),
                    ]),
                ]),
            )
    }

    #[tokio::test]
    async fn test_snapshot_collects_all_sections() {
        let snapshot = inspector(populated()).try_snapshot().await.unwrap();

        assert_eq!(snapshot.labels, vec!["Movie", "Person"]);
        assert_eq!(snapshot.relationship_types, vec!["ACTED_IN"]);
        assert!(snapshot.visualization.is_empty());
        assert_eq!(
            snapshot.node_counts,
            vec![
                LabelCount {
                    labels: vec!["Person".to_string()],
                    count: 2
                },
                LabelCount {
                    labels: vec![],
                    count: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_queries_run_in_order() {
        let driver = populated();
        inspector(driver.clone()).snapshot().await;

        let queries: Vec<String> = driver
            .executed()
            .into_iter()
            .map(|(_, statement)| statement.text)
            .filter(|text| text != crate::connection::LIVENESS_QUERY)
            .collect();
        assert_eq!(
            queries,
            vec![
                LABELS_QUERY,
                RELATIONSHIP_TYPES_QUERY,
                VISUALIZATION_QUERY,
                NODE_COUNTS_QUERY
            ]
        );
    }

    #[tokio::test]
    async fn test_query_failure_degrades_to_empty() {
        let driver = populated().respond(
            VISUALIZATION_QUERY,
            ScriptedResponse::Error(DriverError::query("procedure not found")),
        );
        let inspector = inspector(driver);

        assert!(inspector.snapshot().await.is_empty());
        assert!(matches!(
            inspector.try_snapshot().await,
            Err(GateError::QueryError { .. })
        ));
    }

    #[tokio::test]
    async fn test_unexpected_shape_degrades_to_empty() {
        let driver = populated().respond(
            LABELS_QUERY,
            ScriptedResponse::Records(vec![DriverRecord::from_pairs([(
                "label",
                DriverValue::Integer(3),
            )])]),
        );
        let inspector = inspector(driver);

        assert!(inspector.snapshot().await.is_empty());
        assert!(matches!(
            inspector.try_snapshot().await,
            Err(GateError::SerializationError(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_database_degrades_to_empty() {
        let driver = populated().refuse("neo4j://127.0.0.1:7687");
        assert!(inspector(driver).snapshot().await.is_empty());
    }
}
