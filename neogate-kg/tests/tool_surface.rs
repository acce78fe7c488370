//! Integration tests for the tool facade

use neogate_kg::{
    AddressResolver, ConnectionConfig, ConnectionManager, DriverError, GateError, ScriptedDriver,
    ScriptedResponse, SharedConfig, StaticProbe, ToolSet, CONFIGURE_TOOL,
};
use serde_json::json;
use std::sync::Arc;

fn tool_set(driver: ScriptedDriver) -> ToolSet<ScriptedDriver> {
    let resolver = AddressResolver::new(Arc::new(StaticProbe::native()));
    let manager = ConnectionManager::new(
        SharedConfig::new(ConnectionConfig::default()),
        resolver,
        driver,
    );
    ToolSet::new(Arc::new(manager))
}

#[tokio::test]
async fn test_schema_tool_is_empty_when_database_unreachable() {
    let driver = ScriptedDriver::new().refuse("neo4j://127.0.0.1:7687");
    let tools = tool_set(driver);

    let schema = tools.call("get_neo4j_schema", json!({})).await.unwrap();

    assert_eq!(schema["labels"], json!([]));
    assert_eq!(schema["relationship_types"], json!([]));
    assert_eq!(schema["visualization"], json!([]));
    assert_eq!(schema["node_counts"], json!([]));
}

#[tokio::test]
async fn test_read_error_surfaces_query() {
    let driver = ScriptedDriver::new().respond(
        "MATCH (n:Missing) RETURN n.x",
        ScriptedResponse::Error(DriverError::query("Unknown label")),
    );
    let tools = tool_set(driver);

    let error = tools
        .call("read_neo4j_cypher", json!({"query": "MATCH (n:Missing) RETURN n.x"}))
        .await
        .unwrap_err();

    assert!(matches!(error, GateError::QueryError { ref query, .. } if query == "MATCH (n:Missing) RETURN n.x"));
}

#[tokio::test]
async fn test_toggle_round_trip() {
    let tools = tool_set(ScriptedDriver::new());

    tools
        .call(CONFIGURE_TOOL, json!({"action": "disable", "tool": "write"}))
        .await
        .unwrap();
    let refused = tools
        .call("write_neo4j_cypher", json!({"query": "CREATE (n)"}))
        .await;
    assert!(matches!(refused, Err(GateError::ToolDisabled(_))));

    tools
        .call(CONFIGURE_TOOL, json!({"action": "enable", "tool": "write"}))
        .await
        .unwrap();
    let summary = tools
        .call("write_neo4j_cypher", json!({"query": "CREATE (n)"}))
        .await
        .unwrap();
    assert_eq!(summary["query"], "CREATE (n)");
}

#[tokio::test]
async fn test_configure_rejects_unknown_action() {
    let tools = tool_set(ScriptedDriver::new());

    let error = tools
        .call(CONFIGURE_TOOL, json!({"action": "restart"}))
        .await
        .unwrap_err();

    assert_eq!(
        error.to_string(),
        "Unknown action 'restart'. Use: status, enable, disable, or list"
    );
}
