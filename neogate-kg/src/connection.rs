//! Connection establishment with address fallback
//!
//! [`ConnectionManager`] owns at most one live connection. The first caller
//! of [`ConnectionManager::connect`] sweeps the candidate URIs in order,
//! opening each and running a liveness probe; the first address that answers
//! is cached and every later call gets the same [`ConnectionHandle`] without
//! touching the network.
//!
//! Callers that queue behind a running sweep share its outcome, success or
//! failure. A failed sweep is not sticky: the next `connect()` made after it
//! finished resolves the candidates again and starts over.

use crate::config::SharedConfig;
use crate::driver::{Credentials, DriverValue, GraphConnection, GraphDriver, GraphSession, Statement};
use crate::error::{GateError, Result};
use crate::resolver::{AddressResolver, CandidateAddressList, Resolution};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Query used to verify that an opened connection actually answers
pub const LIVENESS_QUERY: &str = "RETURN 1 AS test";

/// Shared reference to the one verified connection
///
/// Cloning is cheap; all clones refer to the same underlying connection.
pub struct ConnectionHandle<C> {
    inner: Arc<Bound<C>>,
}

struct Bound<C> {
    uri: String,
    connection: C,
}

impl<C> ConnectionHandle<C> {
    fn new(uri: String, connection: C) -> Self {
        Self {
            inner: Arc::new(Bound { uri, connection }),
        }
    }

    /// URI the connection is bound to
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// The driver connection
    pub fn connection(&self) -> &C {
        &self.inner.connection
    }

    /// Whether both handles refer to the same connection
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<C> Clone for ConnectionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for ConnectionHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("uri", &self.inner.uri)
            .finish()
    }
}

/// Externally visible connection state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No connection has been attempted, or it was closed
    Unconnected,
    /// A sweep is in progress
    Connecting,
    /// Bound to a verified address
    Connected { uri: String },
    /// The last sweep found no reachable address
    Failed { attempts: usize, last_error: String },
}

impl ConnectionStatus {
    /// Whether a verified connection is cached
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }
}

enum State<C> {
    Unconnected,
    Connecting,
    Connected(ConnectionHandle<C>),
    Failed { attempts: usize, last_error: String },
}

/// Owns the single database connection and establishes it on demand
pub struct ConnectionManager<D: GraphDriver> {
    config: SharedConfig,
    resolver: AddressResolver,
    driver: D,
    sweep: Mutex<()>,
    /// Completed sweeps; bumped under the sweep lock
    sweeps: AtomicU64,
    state: RwLock<State<D::Connection>>,
}

impl<D: GraphDriver> ConnectionManager<D> {
    /// Create a manager; nothing is opened until [`connect`](Self::connect)
    pub fn new(config: SharedConfig, resolver: AddressResolver, driver: D) -> Self {
        Self {
            config,
            resolver,
            driver,
            sweep: Mutex::new(()),
            sweeps: AtomicU64::new(0),
            state: RwLock::new(State::Unconnected),
        }
    }

    /// Shared configuration this manager reads from
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// The driver connections are opened with
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Candidate URIs a sweep would try right now
    pub async fn candidates(&self) -> CandidateAddressList {
        self.resolution().await.candidates
    }

    /// Environment facts and candidate URIs, without connecting
    pub async fn resolution(&self) -> Resolution {
        let config = self.config.snapshot().await;
        self.resolver.resolve_detailed(&config).await
    }

    /// Current state, for diagnostics
    pub async fn status(&self) -> ConnectionStatus {
        match &*self.state.read().await {
            State::Unconnected => ConnectionStatus::Unconnected,
            State::Connecting => ConnectionStatus::Connecting,
            State::Connected(handle) => ConnectionStatus::Connected {
                uri: handle.uri().to_string(),
            },
            State::Failed {
                attempts,
                last_error,
            } => ConnectionStatus::Failed {
                attempts: *attempts,
                last_error: last_error.clone(),
            },
        }
    }

    /// Return the cached connection, establishing it first if needed
    ///
    /// Concurrent callers share one sweep: whoever arrives while a sweep is
    /// running waits for it and then receives its result.
    pub async fn connect(&self) -> Result<ConnectionHandle<D::Connection>> {
        if let Some(handle) = self.cached().await {
            return Ok(handle);
        }

        let seen = self.sweeps.load(Ordering::Acquire);
        let _sweep = self.sweep.lock().await;
        if let Some(handle) = self.cached().await {
            debug!("Connection established by a concurrent caller");
            return Ok(handle);
        }
        if self.sweeps.load(Ordering::Acquire) != seen {
            if let Some(error) = self.failure().await {
                debug!("Sharing the failure of a concurrent sweep");
                return Err(error);
            }
        }

        *self.state.write().await = State::Connecting;

        let outcome = self.sweep_candidates().await;
        self.sweeps.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(handle) => {
                *self.state.write().await = State::Connected(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                let (attempts, last_error) = match &e {
                    GateError::ConnectionExhausted {
                        attempts,
                        last_error,
                    } => (*attempts, last_error.clone()),
                    other => (0, other.to_string()),
                };
                *self.state.write().await = State::Failed {
                    attempts,
                    last_error,
                };
                Err(e)
            }
        }
    }

    /// Close the cached connection; safe to call at any time
    pub async fn close(&self) {
        let _sweep = self.sweep.lock().await;
        let previous = std::mem::replace(&mut *self.state.write().await, State::Unconnected);

        if let State::Connected(handle) = previous {
            handle.connection().close().await;
            info!("Closed Neo4j connection to {}", handle.uri());
        }
    }

    async fn cached(&self) -> Option<ConnectionHandle<D::Connection>> {
        match &*self.state.read().await {
            State::Connected(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    async fn failure(&self) -> Option<GateError> {
        match &*self.state.read().await {
            State::Failed { attempts: 0, .. } => Some(GateError::NoCandidates),
            State::Failed {
                attempts,
                last_error,
            } => Some(GateError::ConnectionExhausted {
                attempts: *attempts,
                last_error: last_error.clone(),
            }),
            _ => None,
        }
    }

    async fn sweep_candidates(&self) -> Result<ConnectionHandle<D::Connection>> {
        let config = self.config.snapshot().await;
        let candidates = self.resolver.resolve(&config).await;
        if candidates.is_empty() {
            error!("No URIs available for connection");
            return Err(GateError::NoCandidates);
        }

        let credentials = Credentials::new(config.user.as_str(), config.password.as_str());
        let timeout = config.timeout();
        let mut last_error = String::new();

        for (index, uri) in candidates.iter().enumerate() {
            info!(
                "Connecting to Neo4j at {} (database: {}) [{}/{}]",
                uri,
                config.database,
                index + 1,
                candidates.len()
            );

            match self
                .try_candidate(uri, &credentials, &config.database, timeout)
                .await
            {
                Ok(connection) => {
                    info!("Successfully connected to Neo4j at {}", uri);
                    return Ok(ConnectionHandle::new(uri.clone(), connection));
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", uri, e);
                    last_error = e.to_string();
                }
            }
        }

        error!(
            "Failed to connect to Neo4j after trying {} URI(s)",
            candidates.len()
        );
        Err(GateError::ConnectionExhausted {
            attempts: candidates.len(),
            last_error,
        })
    }

    async fn try_candidate(
        &self,
        uri: &str,
        credentials: &Credentials,
        database: &str,
        timeout: Duration,
    ) -> Result<D::Connection> {
        let connection = tokio::time::timeout(timeout, self.driver.open(uri, credentials, timeout))
            .await
            .map_err(|_| GateError::TimeoutError {
                timeout_seconds: timeout.as_secs(),
                context: format!("opening {}", uri),
            })??;

        let verified = tokio::time::timeout(timeout, verify_liveness(&connection, database))
            .await
            .unwrap_or_else(|_| {
                Err(GateError::TimeoutError {
                    timeout_seconds: timeout.as_secs(),
                    context: format!("liveness probe on {}", uri),
                })
            });

        match verified {
            Ok(()) => Ok(connection),
            Err(e) => {
                connection.close().await;
                Err(e)
            }
        }
    }
}

async fn verify_liveness<C: GraphConnection>(connection: &C, database: &str) -> Result<()> {
    let mut session = connection.session(database).await?;
    let result = session.fetch(&Statement::new(LIVENESS_QUERY)).await;
    session.close().await;

    let records = result?;
    match records.first().and_then(|record| record.get("test")) {
        Some(DriverValue::Integer(1)) => Ok(()),
        other => Err(GateError::ConnectionError(format!(
            "liveness probe returned {:?}, expected 1",
            other
        ))),
    }
}

impl<D: GraphDriver> fmt::Debug for ConnectionManager<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager").finish_non_exhaustive()
    }
}
