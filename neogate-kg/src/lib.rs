//! # Neogate Knowledge Graph core (neogate-kg)
//!
//! Neo4j connection resolution and query execution for tool-calling agents.
//!
//! ## Features
//!
//! - WSL detection and Windows host discovery
//! - Ordered candidate URIs with fallback
//! - Single verified connection shared by all callers
//! - Read queries with normalized nodes, relationships and paths
//! - Write queries with update counters
//! - Schema snapshots
//! - Runtime tool toggles
//!
//! ## Connecting
//!
//! Nothing is opened until the first query. The manager then tries the
//! configured URI, and under WSL the Windows host variants, until one
//! answers `RETURN 1 AS test`.
//!
//! ```no_run
//! use neogate_kg::{
//!     AddressResolver, ConnectionConfig, ConnectionManager, Neo4rsDriver, SharedConfig,
//!     SystemProbe,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SharedConfig::new(ConnectionConfig::load()?);
//!     let resolver = AddressResolver::new(Arc::new(SystemProbe::new()));
//!     let manager = ConnectionManager::new(config, resolver, Neo4rsDriver::new());
//!
//!     let handle = manager.connect().await?;
//!     println!("Connected to {}", handle.uri());
//!     Ok(())
//! }
//! ```
//!
//! ## Running queries
//!
//! ```no_run
//! use neogate_kg::{
//!     AddressResolver, ConnectionConfig, ConnectionManager, Neo4rsDriver, QueryExecutor,
//!     SharedConfig, SystemProbe,
//! };
//! use serde_json::{json, Map};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SharedConfig::new(ConnectionConfig::load()?);
//!     let resolver = AddressResolver::new(Arc::new(SystemProbe::new()));
//!     let manager = Arc::new(ConnectionManager::new(config, resolver, Neo4rsDriver::new()));
//!     let executor = QueryExecutor::new(manager);
//!
//!     let mut params = Map::new();
//!     params.insert("name".to_string(), json!("Alice"));
//!
//!     let summary = executor
//!         .execute_write("CREATE (p:Person {name: $name})", params.clone())
//!         .await?;
//!     println!("Created {} node(s)", summary.counters.nodes_created);
//!
//!     let records = executor
//!         .execute_read("MATCH (p:Person {name: $name}) RETURN p", params)
//!         .await?;
//!     for record in records {
//!         println!("{}", record.to_json());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Tools
//!
//! [`ToolSet`] exposes the same operations by name with JSON arguments, for
//! servers that forward agent tool calls.
//!
//! ```no_run
//! use neogate_kg::{
//!     AddressResolver, ConnectionConfig, ConnectionManager, Neo4rsDriver, SharedConfig,
//!     SystemProbe, ToolSet,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SharedConfig::new(ConnectionConfig::load()?);
//!     let resolver = AddressResolver::new(Arc::new(SystemProbe::new()));
//!     let manager = Arc::new(ConnectionManager::new(config, resolver, Neo4rsDriver::new()));
//!     let tools = ToolSet::new(manager);
//!
//!     tools
//!         .call("neo4j_configure", json!({"action": "disable", "tool": "write"}))
//!         .await?;
//!     let schema = tools.call("get_neo4j_schema", json!({})).await?;
//!     println!("{}", serde_json::to_string_pretty(&schema)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod driver;
pub mod environment;
pub mod error;
pub mod executor;
pub mod resolver;
pub mod schema;
pub mod tools;
pub mod value;

// Re-export main types for convenience
pub use config::{ConnectionConfig, SharedConfig, ToolKind, DEFAULT_URI};
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionStatus, LIVENESS_QUERY};
pub use driver::{
    Credentials, DriverError, DriverErrorKind, GraphConnection, GraphDriver, GraphSession,
    Neo4rsDriver, ScriptedDriver, ScriptedResponse, Statement, UriBehavior,
};
pub use environment::{EnvironmentProbe, StaticProbe, SystemProbe};
pub use error::{GateError, Result};
pub use executor::{QueryExecutor, WriteCounters, WriteSummary};
pub use resolver::{AddressResolver, CandidateAddressList, Resolution};
pub use schema::{LabelCount, SchemaInspector, SchemaSnapshot};
pub use tools::{ConfigureAction, ToolDescriptor, ToolSet, CONFIGURE_TOOL};
pub use value::{NormalizedEdge, NormalizedNode, NormalizedPath, NormalizedValue, Record};
