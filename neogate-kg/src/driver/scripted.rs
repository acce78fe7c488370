//! Deterministic in-process driver
//!
//! `ScriptedDriver` behaves like a server whose reachability and answers are
//! decided up front: individual URIs can refuse connections, fail or flunk
//! the liveness probe, or hang; query texts map to canned responses. It also
//! keeps an account of what was attempted, which is what tests assert on.

use super::{
    Credentials, DriverError, DriverRecord, DriverResult, DriverSummary, DriverValue,
    GraphConnection, GraphDriver, GraphSession, Statement,
};
use crate::connection::LIVENESS_QUERY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How a scripted URI reacts to being opened
#[derive(Debug, Clone)]
pub enum UriBehavior {
    /// Opens and answers the liveness probe
    Accept,
    /// `open` fails with the given error
    Refuse(DriverError),
    /// Opens, but the liveness probe fails with the given error
    FailProbe(DriverError),
    /// Opens, but the liveness probe returns this value instead of `1`
    WrongProbe(DriverValue),
    /// `open` never completes
    Hang,
}

/// Canned answer for a query text
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Records returned by `fetch`
    Records(Vec<DriverRecord>),
    /// Summary returned by `consume`
    Summary(DriverSummary),
    /// Both calls fail with this error
    Error(DriverError),
}

#[derive(Debug, Default)]
struct Ledger {
    behaviors: HashMap<String, UriBehavior>,
    responses: HashMap<String, ScriptedResponse>,
    open_attempts: Vec<String>,
    next_connection_id: u64,
    live_connections: usize,
    closed_connections: usize,
    open_sessions: usize,
    sessions_opened: usize,
    executed: Vec<(String, Statement)>,
}

/// Driver with scripted reachability and responses
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    ledger: Arc<Mutex<Ledger>>,
}

impl ScriptedDriver {
    /// A driver where every URI accepts and every query returns nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the behavior of one URI
    pub fn with_uri(self, uri: &str, behavior: UriBehavior) -> Self {
        self.lock().behaviors.insert(uri.to_string(), behavior);
        self
    }

    /// Make `open` fail for a URI with a connection error
    pub fn refuse(self, uri: &str) -> Self {
        let error = DriverError::connection(format!("Connection refused: {}", uri));
        self.with_uri(uri, UriBehavior::Refuse(error))
    }

    /// Register a canned response for a query text
    pub fn respond(self, query: &str, response: ScriptedResponse) -> Self {
        self.lock()
            .responses
            .insert(normalize(query), response);
        self
    }

    /// URIs passed to `open`, in order
    pub fn open_attempts(&self) -> Vec<String> {
        self.lock().open_attempts.clone()
    }

    /// Connections opened and not yet closed
    pub fn live_connections(&self) -> usize {
        self.lock().live_connections
    }

    /// Connections closed so far
    pub fn closed_connections(&self) -> usize {
        self.lock().closed_connections
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    /// Sessions opened so far
    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    /// Statements run, with the URI of the connection that ran them
    pub fn executed(&self) -> Vec<(String, Statement)> {
        self.lock().executed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        lock(&self.ledger)
    }
}

fn lock(ledger: &Mutex<Ledger>) -> MutexGuard<'_, Ledger> {
    ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn normalize(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl GraphDriver for ScriptedDriver {
    type Connection = ScriptedConnection;

    async fn open(
        &self,
        uri: &str,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> DriverResult<ScriptedConnection> {
        let behavior = {
            let mut ledger = self.lock();
            ledger.open_attempts.push(uri.to_string());
            ledger
                .behaviors
                .get(uri)
                .cloned()
                .unwrap_or(UriBehavior::Accept)
        };
        // A real dial always suspends at least once.
        tokio::task::yield_now().await;

        match behavior {
            UriBehavior::Refuse(error) => return Err(error),
            UriBehavior::Hang => std::future::pending::<()>().await,
            _ => {}
        }

        let mut ledger = self.lock();
        ledger.next_connection_id += 1;
        ledger.live_connections += 1;
        Ok(ScriptedConnection {
            id: ledger.next_connection_id,
            uri: uri.to_string(),
            behavior,
            ledger: Arc::clone(&self.ledger),
            closed: Arc::new(Mutex::new(false)),
        })
    }
}

/// Connection handed out by [`ScriptedDriver`]
#[derive(Debug)]
pub struct ScriptedConnection {
    id: u64,
    uri: String,
    behavior: UriBehavior,
    ledger: Arc<Mutex<Ledger>>,
    closed: Arc<Mutex<bool>>,
}

impl ScriptedConnection {
    /// Sequence number of this connection within its driver
    pub fn id(&self) -> u64 {
        self.id
    }

    /// URI this connection was opened against
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl GraphConnection for ScriptedConnection {
    type Session = ScriptedSession;

    async fn session(&self, _database: &str) -> DriverResult<ScriptedSession> {
        let mut ledger = lock(&self.ledger);
        ledger.open_sessions += 1;
        ledger.sessions_opened += 1;
        Ok(ScriptedSession {
            uri: self.uri.clone(),
            behavior: self.behavior.clone(),
            ledger: Arc::clone(&self.ledger),
            closed: false,
        })
    }

    async fn close(&self) {
        let mut closed = self.closed.lock().unwrap_or_else(|p| p.into_inner());
        if !*closed {
            *closed = true;
            let mut ledger = lock(&self.ledger);
            ledger.live_connections -= 1;
            ledger.closed_connections += 1;
        }
    }
}

/// Session handed out by [`ScriptedConnection`]
#[derive(Debug)]
pub struct ScriptedSession {
    uri: String,
    behavior: UriBehavior,
    ledger: Arc<Mutex<Ledger>>,
    closed: bool,
}

impl ScriptedSession {
    fn record(&self, statement: &Statement) -> Option<ScriptedResponse> {
        let mut ledger = lock(&self.ledger);
        ledger.executed.push((self.uri.clone(), statement.clone()));
        ledger.responses.get(&normalize(&statement.text)).cloned()
    }
}

#[async_trait]
impl GraphSession for ScriptedSession {
    async fn fetch(&mut self, statement: &Statement) -> DriverResult<Vec<DriverRecord>> {
        if normalize(&statement.text) == LIVENESS_QUERY {
            return match &self.behavior {
                UriBehavior::FailProbe(error) => Err(error.clone()),
                UriBehavior::WrongProbe(value) => {
                    Ok(vec![DriverRecord::from_pairs([("test", value.clone())])])
                }
                _ => Ok(vec![DriverRecord::from_pairs([(
                    "test",
                    DriverValue::Integer(1),
                )])]),
            };
        }

        match self.record(statement) {
            Some(ScriptedResponse::Records(records)) => Ok(records),
            Some(ScriptedResponse::Error(error)) => Err(error),
            Some(ScriptedResponse::Summary(_)) | None => Ok(Vec::new()),
        }
    }

    async fn consume(&mut self, statement: &Statement) -> DriverResult<DriverSummary> {
        match self.record(statement) {
            Some(ScriptedResponse::Summary(summary)) => Ok(summary),
            Some(ScriptedResponse::Error(error)) => Err(error),
            Some(ScriptedResponse::Records(_)) | None => Ok(DriverSummary {
                available_after: Some(Duration::ZERO),
                consumed_after: Some(Duration::ZERO),
                ..DriverSummary::default()
            }),
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            lock(&self.ledger).open_sessions -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::WriteCounters;

    fn credentials() -> Credentials {
        Credentials::new("neo4j", "password")
    }

    #[tokio::test]
    async fn test_refused_uri_is_recorded() {
        let driver = ScriptedDriver::new().refuse("bolt://a:7687");

        let result = driver
            .open("bolt://a:7687", &credentials(), Duration::from_secs(1))
            .await;

        assert!(result.is_err());
        assert_eq!(driver.open_attempts(), vec!["bolt://a:7687"]);
        assert_eq!(driver.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_canned_responses() {
        let summary = DriverSummary {
            counters: WriteCounters {
                nodes_created: 1,
                ..WriteCounters::default()
            },
            ..DriverSummary::default()
        };
        let driver = ScriptedDriver::new()
            .respond(
                "MATCH (n)   RETURN n",
                ScriptedResponse::Records(vec![DriverRecord::from_pairs([(
                    "n",
                    DriverValue::Integer(7),
                )])]),
            )
            .respond("CREATE (n)", ScriptedResponse::Summary(summary.clone()));

        let conn = driver
            .open("bolt://a:7687", &credentials(), Duration::from_secs(1))
            .await
            .unwrap();
        let mut session = conn.session("neo4j").await.unwrap();

        let records = session.fetch(&Statement::new("MATCH (n) RETURN n")).await.unwrap();
        assert_eq!(records.len(), 1);
        let consumed = session.consume(&Statement::new("CREATE (n)")).await.unwrap();
        assert_eq!(consumed, summary);
        assert_eq!(driver.open_sessions(), 1);

        session.close().await;
        session.close().await;
        conn.close().await;
        conn.close().await;

        assert_eq!(driver.open_sessions(), 0);
        assert_eq!(driver.live_connections(), 0);
        assert_eq!(driver.closed_connections(), 1);
        assert_eq!(driver.executed().len(), 2);
    }
}
