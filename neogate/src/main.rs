use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neogate::{parse_json_object, print_json, ConnectionOverrides};
use neogate_kg::{
    AddressResolver, ConfigureAction, ConnectionConfig, ConnectionManager, EnvironmentProbe,
    Neo4rsDriver, QueryExecutor, SchemaInspector, SharedConfig, StaticProbe, SystemProbe,
    ToolSet,
};

#[derive(Parser)]
#[command(name = "neogate")]
#[command(about = "Neo4j tools for agents, with WSL-aware connection fallback", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionOverrides,

    /// Skip WSL detection and use the configured URI only
    #[arg(long, global = true)]
    native: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the detected environment and the candidate URIs
    Candidates,

    /// Connect and report the URI that answered
    Ping,

    /// Print the database schema
    Schema {
        /// Fail instead of printing an empty schema
        #[arg(long)]
        strict: bool,
    },

    /// Run a read query
    Read {
        /// Cypher query
        query: String,

        /// Query parameters as a JSON object
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Run a write query and print its update counters
    Write {
        /// Cypher query
        query: String,

        /// Query parameters as a JSON object
        #[arg(short, long)]
        params: Option<String>,
    },

    /// List the enabled tools
    Tools,

    /// Invoke a tool by name
    Call {
        /// Tool name (e.g., read_neo4j_cypher)
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
    },

    /// Show or change tool availability
    Configure {
        /// status, enable, disable or list
        action: String,

        /// schema, read or write
        tool: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the JSON output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "neogate=info,neogate_kg=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = ConnectionConfig::load().context("Failed to load configuration")?;
    let config = cli.connection.clone().apply(config)?;
    debug!("Using configuration: {:?}", config);

    let probe: Arc<dyn EnvironmentProbe> = if cli.native {
        Arc::new(StaticProbe::native())
    } else {
        Arc::new(SystemProbe::new())
    };
    let resolver = AddressResolver::new(probe);

    let manager = Arc::new(ConnectionManager::new(
        SharedConfig::new(config),
        resolver,
        Neo4rsDriver::new(),
    ));

    let outcome = run(cli.command, Arc::clone(&manager)).await;
    manager.close().await;
    outcome
}

async fn run(command: Commands, manager: Arc<ConnectionManager<Neo4rsDriver>>) -> Result<()> {
    match command {
        Commands::Candidates => {
            print_json(&manager.resolution().await)?;
        }

        Commands::Ping => {
            let handle = manager.connect().await?;
            print_json(&json!({
                "uri": handle.uri(),
                "status": manager.status().await,
            }))?;
        }

        Commands::Schema { strict } => {
            let inspector = SchemaInspector::new(QueryExecutor::new(manager));
            let snapshot = if strict {
                inspector.try_snapshot().await?
            } else {
                inspector.snapshot().await
            };
            print_json(&snapshot)?;
        }

        Commands::Read { query, params } => {
            let params = parse_json_object(params.as_deref(), "--params")?;
            let records = QueryExecutor::new(manager)
                .execute_read(&query, params)
                .await?;
            print_json(&records)?;
        }

        Commands::Write { query, params } => {
            let params = parse_json_object(params.as_deref(), "--params")?;
            let summary = QueryExecutor::new(manager)
                .execute_write(&query, params)
                .await?;
            print_json(&summary)?;
        }

        Commands::Tools => {
            let tools = ToolSet::new(manager).list_tools().await;
            print_json(&tools)?;
        }

        Commands::Call { tool, args } => {
            let arguments = parse_json_object(args.as_deref(), "--args")?;
            let result = ToolSet::new(manager)
                .call(&tool, serde_json::Value::Object(arguments))
                .await?;
            print_json(&result)?;
        }

        Commands::Configure { action, tool } => {
            let action = ConfigureAction::parse(&action, tool.as_deref())?;
            let result = ToolSet::new(manager).configure(action).await?;
            print_json(&result)?;
        }
    }

    Ok(())
}
