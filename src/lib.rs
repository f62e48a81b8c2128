//! Mode Orchestrator
//!
//! Goal > Project > Milestone > Task hierarchy engine with:
//! - Neo4j storage for the containment graph and its collaborators
//! - Per-container ordering with gap-based positions
//! - Mode cascade, archive-or-delete removal and batch operations
//! - CRUD events broadcast after every committed change

pub mod collab;
pub mod error;
pub mod events;
pub mod hierarchy;
pub mod neo4j;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub neo4j: Neo4jYamlConfig,
    pub logging: LoggingYamlConfig,
    pub events: EventsYamlConfig,
}

/// Neo4j configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "orchestrator123".into(),
        }
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingYamlConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by RUST_LOG
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingYamlConfig {
    fn default() -> Self {
        Self {
            filter: "info,mode_orchestrator=debug".into(),
            json: false,
        }
    }
}

/// Event bus configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsYamlConfig {
    pub capacity: usize,
}

impl Default for EventsYamlConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub log_filter: String,
    pub log_json: bool,
    pub event_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        // 1. Load YAML config (or defaults if file not found)
        let yaml = Self::load_yaml(yaml_path);

        // 2. Build Config with env var overrides
        Ok(Self {
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or(yaml.neo4j.uri),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or(yaml.neo4j.user),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or(yaml.neo4j.password),
            log_filter: std::env::var("RUST_LOG").unwrap_or(yaml.logging.filter),
            log_json: std::env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(yaml.logging.json),
            event_capacity: std::env::var("EVENT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(yaml.events.capacity.max(1)),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn neo4j::EntityStore>,
    pub timers: Arc<dyn collab::TimeTracker>,
    pub access: Arc<dyn collab::AccessControl>,
    pub events: events::EventBus,
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state backed by one Neo4j connection
    pub async fn new(config: Config) -> Result<Self> {
        let neo4j = Arc::new(
            neo4j::client::Neo4jClient::new(
                &config.neo4j_uri,
                &config.neo4j_user,
                &config.neo4j_password,
            )
            .await?,
        );

        Ok(Self {
            store: neo4j.clone(),
            timers: neo4j.clone(),
            access: neo4j,
            events: events::EventBus::new(config.event_capacity),
            config: Arc::new(config),
        })
    }

    /// Hierarchy manager wired to this state's backends and event bus
    pub fn hierarchy(&self) -> hierarchy::HierarchyManager {
        hierarchy::HierarchyManager::new(
            self.store.clone(),
            self.timers.clone(),
            self.access.clone(),
        )
        .with_event_emitter(Arc::new(self.events.clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================
