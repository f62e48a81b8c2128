//! Mode Orchestrator - command line entry point
//!
//! Runs one hierarchy operation against Neo4j and prints the JSON result.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mode_orchestrator::error::OrchestratorError;
use mode_orchestrator::hierarchy::{
    ContainerScope, CreateEntityRequest, ReorderRequest, ScheduleRequest, ScopeDescriptor,
    ScopeKey, Selection, UpdateEntityRequest,
};
use mode_orchestrator::neo4j::{EntityKind, Visibility};
use mode_orchestrator::{AppState, Config};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Goal / Project / Milestone / Task hierarchy engine")]
struct Cli {
    /// Path to config.yaml (defaults to ./config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Acting user
    #[arg(long, global = true, env = "ORCHESTRATOR_USER")]
    user: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and create constraints and indexes
    InitSchema,

    /// Create an entity from a JSON body
    Create {
        #[arg(long)]
        kind: EntityKind,
        /// CreateEntityRequest as JSON
        #[arg(long)]
        data: String,
    },

    /// Partially update an entity from a JSON body
    Update {
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        id: Uuid,
        /// UpdateEntityRequest as JSON; null clears a field
        #[arg(long)]
        data: String,
    },

    /// Archive or delete an entity
    Remove {
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        id: Uuid,
    },

    /// Fetch one entity
    Get {
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        id: Uuid,
        /// active, archived or all
        #[arg(long, default_value = "active")]
        visibility: Visibility,
    },

    /// List one scope in order
    List {
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        mode: Uuid,
        /// ScopeDescriptor as JSON (defaults to the mode's top level)
        #[arg(long)]
        scope: Option<String>,
    },

    /// Overwrite positions inside one scope
    Reorder {
        #[arg(long)]
        kind: EntityKind,
        /// ReorderRequest as JSON
        #[arg(long)]
        data: String,
    },

    /// Operations over a mixed selection
    Batch {
        #[command(subcommand)]
        action: BatchCommand,
    },
}

#[derive(Subcommand)]
enum BatchCommand {
    /// Complete (archive or delete) the selection
    Complete {
        /// Selection as JSON
        #[arg(long)]
        data: String,
    },
    /// Remove the selection, archived entities included
    Delete {
        #[arg(long)]
        data: String,
    },
    /// Move the selection into another mode
    ChangeMode {
        #[arg(long)]
        mode: Uuid,
        #[arg(long)]
        data: String,
    },
    /// Set or clear due dates
    Schedule {
        /// ScheduleRequest as JSON
        #[arg(long)]
        data: String,
    },
    /// Place the selection under a goal, project or milestone
    GroupUnder {
        #[arg(long)]
        parent_type: EntityKind,
        #[arg(long)]
        parent_id: Uuid,
        #[arg(long)]
        data: String,
    },
}

fn parse<T: DeserializeOwned>(data: &str) -> Result<T, OrchestratorError> {
    serde_json::from_str(data)
        .map_err(|e| OrchestratorError::validation("payload", e.to_string()))
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, OrchestratorError> {
    Ok(serde_json::to_value(value).map_err(anyhow::Error::from)?)
}

fn require_user(user: Option<Uuid>) -> Result<Uuid, OrchestratorError> {
    user.ok_or_else(|| OrchestratorError::validation("user", "--user or ORCHESTRATOR_USER is required"))
}

async fn run(state: &AppState, user: Option<Uuid>, command: Commands) -> Result<Value, OrchestratorError> {
    let manager = state.hierarchy();
    match command {
        Commands::InitSchema => Ok(serde_json::json!({ "status": "ok" })),
        Commands::Create { kind, data } => {
            let req: CreateEntityRequest = parse(&data)?;
            to_json(manager.create_entity(require_user(user)?, kind, req).await?)
        }
        Commands::Update { kind, id, data } => {
            let req: UpdateEntityRequest = parse(&data)?;
            to_json(manager.update_entity(require_user(user)?, kind, id, req).await?)
        }
        Commands::Remove { kind, id } => {
            to_json(manager.remove_entity(require_user(user)?, kind, id).await?)
        }
        Commands::Get {
            kind,
            id,
            visibility,
        } => to_json(manager.get_entity(require_user(user)?, kind, id, visibility).await?),
        Commands::List { kind, mode, scope } => {
            let descriptor = match scope {
                Some(scope) => parse(&scope)?,
                None => ScopeDescriptor::Home { container: None },
            };
            let key = match descriptor {
                ScopeDescriptor::Home { container } => ScopeKey::Home(container),
                ScopeDescriptor::Dated { date } => ScopeKey::Dated(date),
            };
            let scope = ContainerScope {
                kind,
                mode_id: mode,
                key,
            };
            to_json(manager.list_scope(require_user(user)?, &scope).await?)
        }
        Commands::Reorder { kind, data } => {
            let req: ReorderRequest = parse(&data)?;
            let updated = manager
                .reorder_in_scope(require_user(user)?, kind, req.mode_id, req.scope, req.changes)
                .await?;
            Ok(serde_json::json!({ "updated": updated }))
        }
        Commands::Batch { action } => {
            let user = require_user(user)?;
            let counts = match action {
                BatchCommand::Complete { data } => {
                    manager.batch_complete(user, &parse::<Selection>(&data)?).await?
                }
                BatchCommand::Delete { data } => {
                    manager.batch_delete(user, &parse::<Selection>(&data)?).await?
                }
                BatchCommand::ChangeMode { mode, data } => {
                    manager
                        .batch_change_mode(user, &parse::<Selection>(&data)?, mode)
                        .await?
                }
                BatchCommand::Schedule { data } => {
                    let req: ScheduleRequest = parse(&data)?;
                    manager.batch_schedule(user, &req.selected, req.payload).await?
                }
                BatchCommand::GroupUnder {
                    parent_type,
                    parent_id,
                    data,
                } => {
                    manager
                        .batch_group_under(user, &parse::<Selection>(&data)?, parent_type, parent_id)
                        .await?
                }
            };
            to_json(counts)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_yaml_and_env(cli.config.as_deref())?;

    // Initialize tracing
    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| "info,mode_orchestrator=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    let state = AppState::new(config).await?;
    tracing::info!("Connected to Neo4j");

    match run(&state, cli.user, cli.command).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            let code = match e {
                OrchestratorError::Validation { .. } => 2,
                OrchestratorError::NotFound { .. } => 3,
                OrchestratorError::Operation(ref inner) => {
                    tracing::error!(error = ?inner, "Operation failed");
                    1
                }
            };
            eprintln!("{}", serde_json::to_string_pretty(&e.to_response())?);
            std::process::exit(code);
        }
    }
}
