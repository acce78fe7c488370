//! Error types for neogate operations
//!
//! This module defines the crate-wide error type. Driver-level failures are
//! described by [`crate::driver::DriverError`] and converted into
//! [`GateError`] at the connection and query boundaries, where the context
//! (which address, which query, how many attempts) is attached.

use crate::driver::{DriverError, DriverErrorKind};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Main error type for neogate operations
#[derive(Error, Debug)]
pub enum GateError {
    /// Connection error - a single candidate address could not be reached
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Authentication error - invalid credentials or permissions
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Every candidate address was tried and none produced a live connection
    #[error("Failed to connect to Neo4j after trying {attempts} URI(s). Last error: {last_error}")]
    ConnectionExhausted { attempts: usize, last_error: String },

    /// The candidate list was empty, nothing to try
    #[error("No URIs available for connection")]
    NoCandidates,

    /// Query execution error, carrying the query and its parameters
    #[error("Query error: {message} (query: {query}, parameters: {})", render_parameters(.parameters))]
    QueryError {
        query: String,
        parameters: Map<String, JsonValue>,
        message: String,
    },

    /// Operation timeout
    #[error("Operation timed out after {timeout_seconds}s: {context}")]
    TimeoutError {
        timeout_seconds: u64,
        context: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The named tool exists but is switched off
    #[error("Tool '{0}' is not available or has been disabled")]
    ToolDisabled(String),

    /// The named tool does not exist
    #[error("Unknown tool '{0}'. Use: schema, read, or write")]
    UnknownTool(String),

    /// Unsupported configure action
    #[error("Unknown action '{0}'. Use: status, enable, disable, or list")]
    UnknownAction(String),

    /// Tool arguments missing or malformed
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl GateError {
    /// Whether this error came out of the connection sweep
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            GateError::ConnectionError(_)
                | GateError::AuthenticationError(_)
                | GateError::ConnectionExhausted { .. }
                | GateError::NoCandidates
                | GateError::TimeoutError { .. }
        )
    }
}

fn render_parameters(parameters: &Map<String, JsonValue>) -> String {
    serde_json::to_string(parameters).unwrap_or_else(|_| "{}".to_string())
}

/// Result type alias for neogate operations
pub type Result<T> = std::result::Result<T, GateError>;

impl From<String> for GateError {
    fn from(s: String) -> Self {
        GateError::Other(s)
    }
}

impl From<&str> for GateError {
    fn from(s: &str) -> Self {
        GateError::Other(s.to_string())
    }
}

// Query failures are wrapped with their statement by the executor; anything
// reaching this conversion happened while establishing a connection.
impl From<DriverError> for GateError {
    fn from(e: DriverError) -> Self {
        match e.kind {
            DriverErrorKind::Authentication => GateError::AuthenticationError(e.message),
            _ => GateError::ConnectionError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for GateError {
    fn from(e: serde_json::Error) -> Self {
        GateError::SerializationError(e.to_string())
    }
}
