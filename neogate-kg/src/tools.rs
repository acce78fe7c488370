//! Tool facade for agent integrations
//!
//! Four named tools sit on top of the executor and schema inspector:
//!
//! | Tool                 | Toggle   | Arguments                    |
//! |----------------------|----------|------------------------------|
//! | `neo4j_configure`    | always   | `action`, optional `tool`    |
//! | `get_neo4j_schema`   | schema   | none                         |
//! | `read_neo4j_cypher`  | read     | `query`, optional `params`   |
//! | `write_neo4j_cypher` | write    | `query`, optional `params`   |
//!
//! Every call returns a JSON payload. Framing those payloads for a wire
//! protocol is left to the embedding server.

use crate::config::{SharedConfig, ToolKind};
use crate::connection::ConnectionManager;
use crate::driver::GraphDriver;
use crate::error::{GateError, Result};
use crate::executor::QueryExecutor;
use crate::schema::SchemaInspector;
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the always-available configuration tool
pub const CONFIGURE_TOOL: &str = "neo4j_configure";

/// Published description of one tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

impl ToolDescriptor {
    fn configure() -> Self {
        Self {
            name: CONFIGURE_TOOL.to_string(),
            description: "Runtime configuration for the Neo4j tools. Shows connection settings \
                          and switches the schema, read and write tools on or off."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "description": "'status' (show current config), 'enable' (enable a tool), 'disable' (disable a tool), 'list' (show tools)",
                        "enum": ["status", "enable", "disable", "list"]
                    },
                    "tool": {
                        "type": "string",
                        "description": "Tool to configure: 'schema', 'read' or 'write'",
                        "enum": ["schema", "read", "write"]
                    }
                },
                "required": ["action"]
            }),
        }
    }

    fn for_kind(kind: ToolKind) -> Self {
        let (description, input_schema) = match kind {
            ToolKind::Schema => (
                "Get the Neo4j database schema: node labels, relationship types, \
                 node counts per label set and the schema visualization.",
                json!({"type": "object", "properties": {}, "required": []}),
            ),
            ToolKind::Read => (
                "Execute a read-only Cypher query and return its records.",
                query_schema("The Cypher query to execute (MATCH, RETURN, WITH, ...)"),
            ),
            ToolKind::Write => (
                "Execute a write Cypher query and return its update counters.",
                query_schema("The Cypher write query to execute (CREATE, MERGE, SET, DELETE, ...)"),
            ),
        };

        Self {
            name: kind.tool_name().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

fn query_schema(query_description: &str) -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "description": query_description},
            "params": {
                "type": "object",
                "description": "Optional parameters for parameterized queries (e.g., {name: 'John', age: 30})",
                "default": {}
            }
        },
        "required": ["query"]
    })
}

/// Runtime configuration commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureAction {
    Status,
    Enable(ToolKind),
    Disable(ToolKind),
    List,
}

impl ConfigureAction {
    /// Parse an action name and its optional tool argument
    pub fn parse(action: &str, tool: Option<&str>) -> Result<Self> {
        let required_tool = |verb: &str| -> Result<ToolKind> {
            let tool = tool.ok_or_else(|| {
                GateError::InvalidArguments(format!(
                    "'tool' parameter required for {} action. Use: schema, read, or write",
                    verb
                ))
            })?;
            ToolKind::from_str(tool)
        };

        match action.trim().to_lowercase().as_str() {
            "status" => Ok(ConfigureAction::Status),
            "list" => Ok(ConfigureAction::List),
            "enable" => Ok(ConfigureAction::Enable(required_tool("enable")?)),
            "disable" => Ok(ConfigureAction::Disable(required_tool("disable")?)),
            other => Err(GateError::UnknownAction(other.to_string())),
        }
    }
}

/// The named tools, bound to one connection manager
pub struct ToolSet<D: GraphDriver> {
    config: SharedConfig,
    executor: QueryExecutor<D>,
    schema: SchemaInspector<D>,
}

impl<D: GraphDriver> ToolSet<D> {
    /// Build the tool set over a connection manager
    pub fn new(manager: Arc<ConnectionManager<D>>) -> Self {
        let config = manager.config().clone();
        let executor = QueryExecutor::new(manager);
        let schema = SchemaInspector::new(executor.clone());
        Self {
            config,
            executor,
            schema,
        }
    }

    /// Descriptors of the configuration tool plus every enabled tool
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let mut tools = vec![ToolDescriptor::configure()];
        for kind in ToolKind::ALL {
            if self.config.is_enabled(kind).await {
                tools.push(ToolDescriptor::for_kind(kind));
            }
        }
        tools
    }

    /// Invoke a tool by name
    pub async fn call(&self, name: &str, arguments: JsonValue) -> Result<JsonValue> {
        let arguments = into_object(arguments)?;
        debug!("Calling tool {}", name);

        if name == CONFIGURE_TOOL {
            let action = optional_str(&arguments, "action")?.ok_or_else(|| {
                GateError::InvalidArguments("'action' parameter is required".to_string())
            })?;
            let tool = optional_str(&arguments, "tool")?;
            return self.configure(ConfigureAction::parse(action, tool)?).await;
        }

        let kind = ToolKind::from_tool_name(name)
            .ok_or_else(|| GateError::UnknownTool(name.to_string()))?;
        if !self.config.is_enabled(kind).await {
            info!("Refusing call to disabled tool {}", name);
            return Err(GateError::ToolDisabled(name.to_string()));
        }

        match kind {
            ToolKind::Schema => Ok(serde_json::to_value(self.schema.snapshot().await)?),
            ToolKind::Read => {
                let (query, params) = query_arguments(&arguments)?;
                let records = self.executor.execute_read(query, params).await?;
                Ok(json!({
                    "count": records.len(),
                    "records": records,
                }))
            }
            ToolKind::Write => {
                let (query, params) = query_arguments(&arguments)?;
                let summary = self.executor.execute_write(query, params).await?;
                Ok(serde_json::to_value(summary)?)
            }
        }
    }

    /// Apply a configuration command
    ///
    /// Only reads or flips tool flags; the connection is never touched.
    pub async fn configure(&self, action: ConfigureAction) -> Result<JsonValue> {
        match action {
            ConfigureAction::Status => {
                let config = self.config.snapshot().await;
                let tools: Map<String, JsonValue> = ToolKind::ALL
                    .iter()
                    .map(|kind| {
                        (
                            kind.tool_name().to_string(),
                            JsonValue::Bool(config.is_enabled(*kind)),
                        )
                    })
                    .collect();
                Ok(json!({
                    "uri": config.uri,
                    "user": config.user,
                    "database": config.database,
                    "tools": tools,
                }))
            }
            ConfigureAction::List => {
                let mut tools = Vec::new();
                for kind in ToolKind::ALL {
                    tools.push(json!({
                        "name": kind.tool_name(),
                        "enabled": self.config.is_enabled(kind).await,
                    }));
                }
                Ok(json!({ "tools": tools }))
            }
            ConfigureAction::Enable(kind) | ConfigureAction::Disable(kind) => {
                let enabled = matches!(action, ConfigureAction::Enable(_));
                let previous = self.config.set_enabled(kind, enabled).await;
                Ok(json!({
                    "tool": kind.tool_name(),
                    "enabled": enabled,
                    "previous": previous,
                }))
            }
        }
    }
}

fn into_object(arguments: JsonValue) -> Result<Map<String, JsonValue>> {
    match arguments {
        JsonValue::Object(map) => Ok(map),
        JsonValue::Null => Ok(Map::new()),
        other => Err(GateError::InvalidArguments(format!(
            "arguments must be an object, got {}",
            other
        ))),
    }
}

fn optional_str<'a>(arguments: &'a Map<String, JsonValue>, key: &str) -> Result<Option<&'a str>> {
    match arguments.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(other) => Err(GateError::InvalidArguments(format!(
            "'{}' must be a string, got {}",
            key, other
        ))),
    }
}

fn query_arguments(arguments: &Map<String, JsonValue>) -> Result<(&str, Map<String, JsonValue>)> {
    let query = optional_str(arguments, "query")?
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| GateError::InvalidArguments("'query' parameter is required".to_string()))?;

    let params = match arguments.get("params") {
        None | Some(JsonValue::Null) => Map::new(),
        Some(JsonValue::Object(map)) => map.clone(),
        Some(other) => {
            return Err(GateError::InvalidArguments(format!(
                "'params' must be an object, got {}",
                other
            )))
        }
    };

    Ok((query, params))
}
