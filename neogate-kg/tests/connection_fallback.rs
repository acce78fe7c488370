//! Integration tests for candidate fallback and connection reuse
//!
//! These run against `ScriptedDriver`, so no database is needed.

use futures::future::join_all;
use neogate_kg::{
    AddressResolver, ConnectionConfig, ConnectionManager, ConnectionStatus, GateError,
    QueryExecutor, ScriptedDriver, SharedConfig, StaticProbe,
};
use serde_json::Map;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

const HOST: &str = "172.19.0.1";
const ALTERNATES: [&str; 3] = ["192.168.1.10", "192.168.1.11", "10.0.0.2"];

fn config() -> ConnectionConfig {
    ConnectionConfig {
        uri: "neo4j://127.0.0.1:7687".to_string(),
        windows_host_ips: ALTERNATES.iter().map(|s| s.to_string()).collect(),
        connection_timeout: 5,
        ..ConnectionConfig::default()
    }
}

fn manager(driver: ScriptedDriver) -> ConnectionManager<ScriptedDriver> {
    let resolver = AddressResolver::new(Arc::new(StaticProbe::nested(Some(HOST))));
    ConnectionManager::new(SharedConfig::new(config()), resolver, driver)
}

#[tokio::test]
async fn test_candidate_order_under_wsl() {
    let manager = manager(ScriptedDriver::new());
    let candidates = manager.candidates().await;

    assert_eq!(
        candidates.uris(),
        [
            "neo4j://127.0.0.1:7687",
            "neo4j://172.19.0.1:7687",
            "neo4j://192.168.1.10:7687",
            "neo4j://192.168.1.11:7687",
            "neo4j://10.0.0.2:7687",
        ]
    );
}

#[tokio::test]
async fn test_first_reachable_candidate_wins() {
    // For every prefix of failing candidates, the next one is selected and
    // nothing after it is tried.
    let candidates = manager(ScriptedDriver::new()).candidates().await;
    let total = candidates.len();

    for failing in 0..total {
        let mut driver = ScriptedDriver::new();
        for uri in candidates.iter().take(failing) {
            driver = driver.refuse(uri);
        }
        let manager = manager(driver.clone());

        let handle = assert_ok!(manager.connect().await);

        assert_eq!(handle.uri(), candidates.uris()[failing]);
        assert_eq!(driver.open_attempts(), candidates.uris()[..=failing]);
        assert_eq!(driver.live_connections(), 1);
    }
}

#[tokio::test]
async fn test_all_candidates_unreachable() {
    let candidates = manager(ScriptedDriver::new()).candidates().await;
    let mut driver = ScriptedDriver::new();
    for uri in &candidates {
        driver = driver.refuse(uri);
    }
    let manager = manager(driver.clone());

    let error = assert_err!(manager.connect().await);

    assert!(error.is_connection_failure());
    match error {
        GateError::ConnectionExhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, candidates.len());
            assert!(last_error.contains("10.0.0.2"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(driver.live_connections(), 0);
    assert!(matches!(
        manager.status().await,
        ConnectionStatus::Failed { attempts: 5, .. }
    ));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_sweep() {
    let driver = ScriptedDriver::new()
        .refuse("neo4j://127.0.0.1:7687")
        .refuse("neo4j://172.19.0.1:7687");
    let manager = Arc::new(manager(driver.clone()));

    let handles = join_all((0..16).map(|_| {
        let manager = Arc::clone(&manager);
        async move { manager.connect().await }
    }))
    .await;

    let handles: Vec<_> = handles.into_iter().map(|h| h.unwrap()).collect();
    assert!(handles.iter().all(|h| h.same_as(&handles[0])));
    assert_eq!(handles[0].uri(), "neo4j://192.168.1.10:7687");
    assert_eq!(driver.open_attempts().len(), 3);
    assert_eq!(driver.live_connections(), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_a_failed_sweep() {
    let candidates = manager(ScriptedDriver::new()).candidates().await;
    let mut driver = ScriptedDriver::new();
    for uri in &candidates {
        driver = driver.refuse(uri);
    }
    let manager = Arc::new(manager(driver.clone()));

    let outcomes = join_all((0..8).map(|_| {
        let manager = Arc::clone(&manager);
        async move { manager.connect().await }
    }))
    .await;

    assert!(outcomes.iter().all(|outcome| matches!(
        outcome,
        Err(GateError::ConnectionExhausted { attempts: 5, .. })
    )));
    assert_eq!(driver.open_attempts().len(), candidates.len());

    // Once that sweep is over, the next caller starts a new one
    assert_err!(manager.connect().await);
    assert_eq!(driver.open_attempts().len(), 2 * candidates.len());
}

#[tokio::test]
async fn test_close_then_reconnect() {
    let driver = ScriptedDriver::new();
    let manager = Arc::new(manager(driver.clone()));

    let first = assert_ok!(manager.connect().await);
    manager.close().await;
    manager.close().await;
    assert_eq!(driver.live_connections(), 0);

    let second = assert_ok!(manager.connect().await);
    assert!(!first.same_as(&second));
    assert_eq!(driver.live_connections(), 1);
    assert_eq!(driver.closed_connections(), 1);
}

#[tokio::test]
async fn test_queries_reuse_connection() {
    let driver = ScriptedDriver::new();
    let executor = QueryExecutor::new(Arc::new(manager(driver.clone())));

    for _ in 0..5 {
        assert_ok!(executor.execute_read("MATCH (n) RETURN n", Map::new()).await);
        assert_ok!(executor.execute_write("CREATE (n)", Map::new()).await);
    }

    assert_eq!(driver.open_attempts().len(), 1);
    assert_eq!(driver.live_connections(), 1);
    assert_eq!(driver.open_sessions(), 0);
    // one liveness session plus one per query
    assert_eq!(driver.sessions_opened(), 11);
}
