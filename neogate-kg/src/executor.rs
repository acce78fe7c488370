//! Read and write query execution
//!
//! Every call goes through [`ConnectionManager::connect`], so the first query
//! is what establishes the connection. Each call runs in its own session,
//! which is closed before the call returns, whether it succeeded or not.

use crate::connection::ConnectionManager;
use crate::driver::{DriverError, GraphConnection, GraphDriver, GraphSession, Statement};
use crate::error::{GateError, Result};
use crate::value::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub use crate::driver::WriteCounters;

/// Outcome of a write query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteSummary {
    /// Query text as submitted
    pub query: String,
    /// Parameters as submitted
    pub parameters: Map<String, JsonValue>,
    /// Mutation counters
    pub counters: WriteCounters,
    /// Milliseconds until the first record was available
    pub result_available_after_ms: Option<u64>,
    /// Milliseconds until the result was fully consumed
    pub result_consumed_after_ms: Option<u64>,
}

/// Runs queries against the managed connection
pub struct QueryExecutor<D: GraphDriver> {
    manager: Arc<ConnectionManager<D>>,
}

impl<D: GraphDriver> Clone for QueryExecutor<D> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

impl<D: GraphDriver> QueryExecutor<D> {
    /// Create an executor over a shared connection manager
    pub fn new(manager: Arc<ConnectionManager<D>>) -> Self {
        Self { manager }
    }

    /// The connection manager queries run through
    pub fn manager(&self) -> &Arc<ConnectionManager<D>> {
        &self.manager
    }

    /// Run a query and return every record, normalized
    pub async fn execute_read(
        &self,
        query: &str,
        params: Map<String, JsonValue>,
    ) -> Result<Vec<Record>> {
        let statement = Statement::with_params(query, params);
        let database = self.manager.config().snapshot().await.database;
        let handle = self.manager.connect().await?;

        debug!("Executing read query on {}: {}", handle.uri(), query);

        let mut session = handle
            .connection()
            .session(&database)
            .await
            .map_err(|e| query_error(&statement, e))?;
        let result = session.fetch(&statement).await;
        session.close().await;

        let records = result.map_err(|e| query_error(&statement, e))?;
        debug!("Read query returned {} record(s)", records.len());
        Ok(records.into_iter().map(Record::from).collect())
    }

    /// Run a query, consume its result and report counters and timings
    ///
    /// A query that changes nothing reports all-zero counters.
    pub async fn execute_write(
        &self,
        query: &str,
        params: Map<String, JsonValue>,
    ) -> Result<WriteSummary> {
        let statement = Statement::with_params(query, params);
        let database = self.manager.config().snapshot().await.database;
        let handle = self.manager.connect().await?;

        debug!("Executing write query on {}: {}", handle.uri(), query);

        let mut session = handle
            .connection()
            .session(&database)
            .await
            .map_err(|e| query_error(&statement, e))?;
        let result = session.consume(&statement).await;
        session.close().await;

        let summary = result.map_err(|e| query_error(&statement, e))?;
        debug!(
            "Write query changed {} item(s)",
            summary.counters.total()
        );

        Ok(WriteSummary {
            query: statement.text,
            parameters: statement.params,
            counters: summary.counters,
            result_available_after_ms: summary.available_after.map(millis),
            result_consumed_after_ms: summary.consumed_after.map(millis),
        })
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn query_error(statement: &Statement, e: DriverError) -> GateError {
    error!("Query failed: {}", e);
    GateError::QueryError {
        query: statement.text.clone(),
        parameters: statement.params.clone(),
        message: e.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, SharedConfig};
    use crate::driver::{DriverRecord, DriverSummary, DriverValue, ScriptedDriver, ScriptedResponse};
    use crate::environment::StaticProbe;
    use crate::resolver::AddressResolver;
    use serde_json::json;

    fn executor(driver: ScriptedDriver) -> QueryExecutor<ScriptedDriver> {
        let resolver = AddressResolver::new(Arc::new(StaticProbe::native()));
        let manager = ConnectionManager::new(
            SharedConfig::new(ConnectionConfig::default()),
            resolver,
            driver,
        );
        QueryExecutor::new(Arc::new(manager))
    }

    fn params(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_read_normalizes_records() {
        let driver = ScriptedDriver::new().respond(
            "MATCH (p:Person) RETURN p.name AS name",
            ScriptedResponse::Records(vec![
                DriverRecord::from_pairs([("name", DriverValue::String("Alice".into()))]),
                DriverRecord::from_pairs([("name", DriverValue::String("Bob".into()))]),
            ]),
        );
        let executor = executor(driver.clone());

        let records = executor
            .execute_read("MATCH (p:Person) RETURN p.name AS name", Map::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name").and_then(|v| v.as_str()), Some("Alice"));
        assert_eq!(driver.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_read_passes_parameters() {
        let driver = ScriptedDriver::new();
        let executor = executor(driver.clone());

        executor
            .execute_read(
                "MATCH (p {name: $name}) RETURN p",
                params(json!({"name": "Alice"})),
            )
            .await
            .unwrap();

        let executed = driver.executed();
        let (_, statement) = executed.last().unwrap();
        assert_eq!(statement.params["name"], "Alice");
    }

    #[tokio::test]
    async fn test_write_reports_counters_and_timings() {
        let driver = ScriptedDriver::new().respond(
            "CREATE (p:Person {name: $name})",
            ScriptedResponse::Summary(DriverSummary {
                counters: WriteCounters {
                    nodes_created: 1,
                    labels_added: 1,
                    properties_set: 1,
                    ..WriteCounters::default()
                },
                available_after: Some(Duration::from_millis(3)),
                consumed_after: Some(Duration::from_millis(5)),
            }),
        );
        let executor = executor(driver);

        let summary = executor
            .execute_write(
                "CREATE (p:Person {name: $name})",
                params(json!({"name": "Alice"})),
            )
            .await
            .unwrap();

        assert_eq!(summary.counters.nodes_created, 1);
        assert_eq!(summary.counters.total(), 3);
        assert_eq!(summary.result_available_after_ms, Some(3));
        assert_eq!(summary.result_consumed_after_ms, Some(5));
        assert_eq!(summary.parameters["name"], "Alice");
    }

    #[tokio::test]
    async fn test_write_without_server_timings() {
        let driver = ScriptedDriver::new().respond(
            "MATCH (n) SET n.seen = true",
            ScriptedResponse::Summary(DriverSummary {
                counters: WriteCounters {
                    properties_set: 4,
                    ..WriteCounters::default()
                },
                available_after: None,
                consumed_after: Some(Duration::from_secs(u64::MAX)),
            }),
        );
        let executor = executor(driver.clone());

        let summary = executor
            .execute_write("MATCH (n) SET n.seen = true", Map::new())
            .await
            .unwrap();

        assert_eq!(summary.counters.properties_set, 4);
        assert_eq!(summary.result_available_after_ms, None);
        assert_eq!(summary.result_consumed_after_ms, Some(u64::MAX));
        assert_eq!(driver.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_query_failure_carries_query_and_closes_session() {
        let driver = ScriptedDriver::new().respond(
            "MATCH (n RETURN n",
            ScriptedResponse::Error(DriverError::query("Invalid input 'R'")),
        );
        let executor = executor(driver.clone());

        let error = executor
            .execute_read("MATCH (n RETURN n", params(json!({"limit": 5})))
            .await
            .unwrap_err();

        match error {
            GateError::QueryError {
                query,
                parameters,
                message,
            } => {
                assert_eq!(query, "MATCH (n RETURN n");
                assert_eq!(parameters["limit"], 5);
                assert!(message.contains("Invalid input"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(driver.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_connection_failure_is_not_a_query_error() {
        let driver = ScriptedDriver::new().refuse("neo4j://127.0.0.1:7687");
        let executor = executor(driver);

        let error = executor
            .execute_read("RETURN 1", Map::new())
            .await
            .unwrap_err();

        assert!(matches!(error, GateError::ConnectionExhausted { attempts: 1, .. }));
    }

    #[test]
    fn test_write_summary_serializes_field_names() {
        let summary = WriteSummary {
            query: "CREATE (n)".to_string(),
            parameters: Map::new(),
            counters: WriteCounters::default(),
            result_available_after_ms: Some(1),
            result_consumed_after_ms: None,
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["counters"]["nodes_created"], 0);
        assert_eq!(json["result_available_after_ms"], 1);
        assert!(json["result_consumed_after_ms"].is_null());
    }
}
