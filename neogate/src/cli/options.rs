use anyhow::{bail, Context, Result};
use clap::Args;
use neogate_kg::ConnectionConfig;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// Connection settings that override the environment
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionOverrides {
    /// Primary connection URI
    #[arg(long, global = true)]
    pub uri: Option<String>,

    /// Username
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Password
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Database name
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Per-candidate connection timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Alternate Windows host addresses, comma separated
    #[arg(long, global = true, value_delimiter = ',')]
    pub windows_host_ips: Option<Vec<String>>,
}

impl ConnectionOverrides {
    /// Apply every override that was given, then re-validate
    pub fn apply(self, mut config: ConnectionConfig) -> Result<ConnectionConfig> {
        if let Some(uri) = self.uri {
            config.uri = uri;
        }
        if let Some(user) = self.user {
            config.user = user;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        if let Some(database) = self.database {
            config.database = database;
        }
        if let Some(timeout) = self.timeout {
            config.connection_timeout = timeout;
        }
        if let Some(ips) = self.windows_host_ips {
            config.windows_host_ips = ips
                .into_iter()
                .map(|ip| ip.trim().to_string())
                .filter(|ip| !ip.is_empty())
                .collect();
        }

        config.validate().context("Invalid connection settings")?;
        Ok(config)
    }
}

/// Parse an optional JSON argument that must be an object
pub fn parse_json_object(raw: Option<&str>, what: &str) -> Result<Map<String, JsonValue>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };

    let value: JsonValue =
        serde_json::from_str(raw).with_context(|| format!("{} is not valid JSON", what))?;
    match value {
        JsonValue::Object(map) => Ok(map),
        JsonValue::Null => Ok(Map::new()),
        other => bail!("{} must be a JSON object, got {}", what, other),
    }
}

/// Pretty-print a value as JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", rendered);
    Ok(())
}
