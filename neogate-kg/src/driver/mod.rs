//! Driver seam
//!
//! Everything above this module talks to the database through three small
//! traits: a [`GraphDriver`] opens a [`GraphConnection`], which hands out
//! short-lived [`GraphSession`]s bound to a database. Values crossing the
//! seam are already lifted into [`DriverValue`], the closed set of types a
//! Bolt server can return, so nothing upstream inspects driver-native types.
//!
//! Two implementations ship with the crate: [`Neo4rsDriver`] for real
//! servers and [`ScriptedDriver`] for deterministic runs without one.

mod bolt;
mod scripted;

pub use self::bolt::{Neo4rsConnection, Neo4rsDriver, Neo4rsSession};
pub use self::scripted::{
    ScriptedConnection, ScriptedDriver, ScriptedResponse, ScriptedSession, UriBehavior,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Broad category of a driver failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Network, routing or pool failure
    Connection,
    /// Credentials rejected
    Authentication,
    /// Server rejected or failed the query
    Query,
    /// Response could not be decoded
    Protocol,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverErrorKind::Connection => "connection",
            DriverErrorKind::Authentication => "authentication",
            DriverErrorKind::Query => "query",
            DriverErrorKind::Protocol => "protocol",
        };
        f.write_str(name)
    }
}

/// Error reported by a driver implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} failure: {message}")]
pub struct DriverError {
    /// Failure category
    pub kind: DriverErrorKind,
    /// Driver-provided description
    pub message: String,
}

impl DriverError {
    /// Create an error of the given kind
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a connection failure
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connection, message)
    }

    /// Shorthand for a query failure
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Query, message)
    }
}

/// Result type alias for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Username and password pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username
    pub user: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create a credentials pair
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// A query with its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Cypher text
    pub text: String,
    /// Named parameters
    pub params: Map<String, JsonValue>,
}

impl Statement {
    /// A statement without parameters
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Map::new(),
        }
    }

    /// A statement with parameters
    pub fn with_params(text: impl Into<String>, params: Map<String, JsonValue>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
}

/// Node as returned by the server
#[derive(Debug, Clone, PartialEq)]
pub struct DriverNode {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, DriverValue>,
}

/// Relationship as returned by the server
#[derive(Debug, Clone, PartialEq)]
pub struct DriverRelationship {
    pub id: i64,
    pub rel_type: String,
    pub start_id: i64,
    pub end_id: i64,
    pub properties: BTreeMap<String, DriverValue>,
}

/// Path as returned by the server
#[derive(Debug, Clone, PartialEq)]
pub struct DriverPath {
    pub nodes: Vec<DriverNode>,
    pub relationships: Vec<DriverRelationship>,
}

/// Every value type a server can put in a record
#[derive(Debug, Clone, PartialEq)]
pub enum DriverValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Temporal and spatial values, rendered by the driver
    Other(String),
    List(Vec<DriverValue>),
    Map(BTreeMap<String, DriverValue>),
    Node(DriverNode),
    Relationship(DriverRelationship),
    Path(DriverPath),
}

impl From<JsonValue> for DriverValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => DriverValue::Null,
            JsonValue::Bool(b) => DriverValue::Boolean(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => DriverValue::Integer(i),
                None => DriverValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => DriverValue::String(s),
            JsonValue::Array(items) => {
                DriverValue::List(items.into_iter().map(DriverValue::from).collect())
            }
            JsonValue::Object(map) => DriverValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, DriverValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// One result row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DriverRecord {
    /// Column names, in server order
    pub keys: Vec<String>,
    /// One value per column
    pub values: Vec<DriverValue>,
}

impl DriverRecord {
    /// Build a record from `(column, value)` pairs
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, DriverValue)>,
        K: Into<String>,
    {
        let (keys, values) = pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self { keys, values }
    }

    /// Value of a column
    pub fn get(&self, key: &str) -> Option<&DriverValue> {
        self.keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.values.get(i))
    }
}

/// Mutation counters reported after a query is consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteCounters {
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub relationships_created: u64,
    pub relationships_deleted: u64,
    pub properties_set: u64,
    pub labels_added: u64,
    pub labels_removed: u64,
    pub indexes_added: u64,
    pub indexes_removed: u64,
    pub constraints_added: u64,
    pub constraints_removed: u64,
}

impl WriteCounters {
    /// Sum of all counters
    pub fn total(&self) -> u64 {
        self.nodes_created
            + self.nodes_deleted
            + self.relationships_created
            + self.relationships_deleted
            + self.properties_set
            + self.labels_added
            + self.labels_removed
            + self.indexes_added
            + self.indexes_removed
            + self.constraints_added
            + self.constraints_removed
    }

    /// Whether the query changed anything
    pub fn contains_updates(&self) -> bool {
        self.total() > 0
    }
}

/// Outcome of consuming a query result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DriverSummary {
    pub counters: WriteCounters,
    /// Time until the first record was available
    pub available_after: Option<Duration>,
    /// Time until the result was fully consumed
    pub consumed_after: Option<Duration>,
}

/// Opens connections to a database server
#[async_trait]
pub trait GraphDriver: Send + Sync {
    type Connection: GraphConnection;

    /// Open a connection; implementations may connect lazily, the caller
    /// verifies liveness separately.
    async fn open(
        &self,
        uri: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> DriverResult<Self::Connection>;
}

/// A live connection (or pool) to one server address
#[async_trait]
pub trait GraphConnection: Send + Sync + 'static {
    type Session: GraphSession;

    /// Open a session bound to a database
    async fn session(&self, database: &str) -> DriverResult<Self::Session>;

    /// Release the connection; must be safe to call more than once
    async fn close(&self);
}

/// A scoped unit of work against one database
#[async_trait]
pub trait GraphSession: Send {
    /// Run a statement and collect every record
    async fn fetch(&mut self, statement: &Statement) -> DriverResult<Vec<DriverRecord>>;

    /// Run a statement and consume it for counters and timings
    async fn consume(&mut self, statement: &Statement) -> DriverResult<DriverSummary>;

    /// Release the session
    async fn close(&mut self);
}
