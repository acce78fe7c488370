//! Connection configuration and runtime tool toggles
//!
//! [`ConnectionConfig`] is built once at start-up (environment variables,
//! optionally seeded from a `.env` file) and then shared as a
//! [`SharedConfig`]. The connection fields never change after start-up; only
//! the three tool flags are mutated, through [`SharedConfig::set_enabled`].

use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default primary URI
pub const DEFAULT_URI: &str = "neo4j://127.0.0.1:7687";

/// URI schemes accepted by the driver
const SUPPORTED_SCHEMES: &[&str] = &["bolt", "bolt+s", "bolt+ssc", "neo4j", "neo4j+s", "neo4j+ssc"];

/// Neo4j connection configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Primary connection URI, always tried first
    pub uri: String,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Database name sessions are bound to
    pub database: String,
    /// Additional host addresses to try when running under WSL
    pub windows_host_ips: Vec<String>,
    /// Per-candidate connection timeout in seconds
    pub connection_timeout: u64,
    /// Declared retry budget. Each `connect()` is a single sweep over the
    /// candidates; this value is carried for reporting only.
    pub max_connection_retries: u32,
    /// Whether `get_neo4j_schema` is exposed
    pub enable_schema_tool: bool,
    /// Whether `read_neo4j_cypher` is exposed
    pub enable_read_tool: bool,
    /// Whether `write_neo4j_cypher` is exposed
    pub enable_write_tool: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            database: "neo4j".to_string(),
            windows_host_ips: Vec::new(),
            connection_timeout: 30,
            max_connection_retries: 3,
            enable_schema_tool: true,
            enable_read_tool: true,
            enable_write_tool: true,
        }
    }
}

// Hand-written so the password never reaches logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("windows_host_ips", &self.windows_host_ips)
            .field("connection_timeout", &self.connection_timeout)
            .field("max_connection_retries", &self.max_connection_retries)
            .field("enable_schema_tool", &self.enable_schema_tool)
            .field("enable_read_tool", &self.enable_read_tool)
            .field("enable_write_tool", &self.enable_write_tool)
            .finish()
    }
}

impl ConnectionConfig {
    /// Load configuration, reading a `.env` file first if one is present
    pub fn load() -> Result<Self> {
        match dotenv::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(_) => debug!("No .env file found, using process environment"),
        }
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from `NEO4J_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Missing keys fall back to the defaults; numeric keys that are present
    /// but unparsable are a [`GateError::ConfigError`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let connection_timeout = match lookup("NEO4J_TIMEOUT") {
            Some(raw) => parse_number("NEO4J_TIMEOUT", &raw)?,
            None => defaults.connection_timeout,
        };
        let max_connection_retries = match lookup("NEO4J_RETRIES") {
            Some(raw) => parse_number("NEO4J_RETRIES", &raw)?,
            None => defaults.max_connection_retries,
        };

        let windows_host_ips = lookup("NEO4J_WINDOWS_HOST_IPS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            uri: lookup("NEO4J_URI").unwrap_or(defaults.uri),
            user: lookup("NEO4J_USER").unwrap_or(defaults.user),
            password: lookup("NEO4J_PASSWORD").unwrap_or(defaults.password),
            database: lookup("NEO4J_DATABASE").unwrap_or(defaults.database),
            windows_host_ips,
            connection_timeout,
            max_connection_retries,
            enable_schema_tool: flag(lookup("NEO4J_ENABLE_SCHEMA")),
            enable_read_tool: flag(lookup("NEO4J_ENABLE_READ")),
            enable_write_tool: flag(lookup("NEO4J_ENABLE_WRITE")),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(GateError::ConfigError("uri must not be empty".to_string()));
        }

        let scheme = self
            .uri
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| {
                GateError::ConfigError(format!("uri '{}' has no scheme", self.uri))
            })?;
        if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
            return Err(GateError::ConfigError(format!(
                "unsupported scheme '{}', expected one of: {}",
                scheme,
                SUPPORTED_SCHEMES.join(", ")
            )));
        }

        if self.database.trim().is_empty() {
            return Err(GateError::ConfigError(
                "database must not be empty".to_string(),
            ));
        }

        if self.connection_timeout == 0 {
            return Err(GateError::ConfigError(
                "connection_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Connection timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    /// Whether the given tool is currently exposed
    pub fn is_enabled(&self, tool: ToolKind) -> bool {
        match tool {
            ToolKind::Schema => self.enable_schema_tool,
            ToolKind::Read => self.enable_read_tool,
            ToolKind::Write => self.enable_write_tool,
        }
    }

    fn flag_mut(&mut self, tool: ToolKind) -> &mut bool {
        match tool {
            ToolKind::Schema => &mut self.enable_schema_tool,
            ToolKind::Read => &mut self.enable_read_tool,
            ToolKind::Write => &mut self.enable_write_tool,
        }
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| GateError::ConfigError(format!("{} must be a number, got '{}'", key, raw)))
}

fn flag(raw: Option<String>) -> bool {
    raw.map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(true)
}

/// The three toggleable database tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Schema introspection
    Schema,
    /// Read queries
    Read,
    /// Write queries
    Write,
}

impl ToolKind {
    /// All toggleable tools, in listing order
    pub const ALL: [ToolKind; 3] = [ToolKind::Schema, ToolKind::Read, ToolKind::Write];

    /// Short name used by the configure action
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Schema => "schema",
            ToolKind::Read => "read",
            ToolKind::Write => "write",
        }
    }

    /// Name the tool is published under
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolKind::Schema => "get_neo4j_schema",
            ToolKind::Read => "read_neo4j_cypher",
            ToolKind::Write => "write_neo4j_cypher",
        }
    }

    /// Resolve a published tool name
    pub fn from_tool_name(name: &str) -> Option<Self> {
        ToolKind::ALL.into_iter().find(|t| t.tool_name() == name)
    }
}

impl FromStr for ToolKind {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "schema" => Ok(ToolKind::Schema),
            "read" => Ok(ToolKind::Read),
            "write" => Ok(ToolKind::Write),
            other => Err(GateError::UnknownTool(other.to_string())),
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration shared between the connection manager and the tool layer
///
/// Cloning shares the same underlying configuration.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<ConnectionConfig>>,
}

impl SharedConfig {
    /// Wrap a configuration for sharing
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current configuration
    pub async fn snapshot(&self) -> ConnectionConfig {
        self.inner.read().await.clone()
    }

    /// Whether the given tool is currently exposed
    pub async fn is_enabled(&self, tool: ToolKind) -> bool {
        self.inner.read().await.is_enabled(tool)
    }

    /// Switch a tool on or off, returning the previous state
    pub async fn set_enabled(&self, tool: ToolKind, enabled: bool) -> bool {
        let mut config = self.inner.write().await;
        let flag = config.flag_mut(tool);
        let previous = std::mem::replace(flag, enabled);
        info!(
            "Tool {} {}",
            tool.tool_name(),
            if enabled { "enabled" } else { "disabled" }
        );
        previous
    }
}

impl From<ConnectionConfig> for SharedConfig {
    fn from(config: ConnectionConfig) -> Self {
        Self::new(config)
    }
}
