//! CRUD event types for hierarchy mutations

use crate::neo4j::models::EntityKind;
use serde::{Deserialize, Serialize};

/// The type of entity that was mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Goal,
    Project,
    Milestone,
    Task,
}

impl From<EntityKind> for EntityType {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Goal => EntityType::Goal,
            EntityKind::Project => EntityType::Project,
            EntityKind::Milestone => EntityType::Milestone,
            EntityKind::Task => EntityType::Task,
        }
    }
}

/// The CRUD action performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrudAction {
    Created,
    Updated,
    Archived,
    Deleted,
    Reordered,
}

/// A CRUD event emitted after a successful commit
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrudEvent {
    /// The type of entity that was mutated
    pub entity_type: EntityType,
    /// The action performed
    pub action: CrudAction,
    /// The ID of the mutated entity (empty for scope-wide actions)
    pub entity_id: String,
    /// Optional payload with entity data
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Mode the entity lives in, for client-side filtering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_id: Option<String>,
}

impl CrudEvent {
    /// Create a new CrudEvent with the current timestamp
    pub fn new(entity_type: EntityType, action: CrudAction, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            action,
            entity_id: entity_id.into(),
            payload: serde_json::Value::Null,
            timestamp: chrono::Utc::now().to_rfc3339(),
            mode_id: None,
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the mode ID
    pub fn with_mode_id(mut self, mode_id: impl Into<String>) -> Self {
        self.mode_id = Some(mode_id.into());
        self
    }
}

/// Sink for committed mutations. Emitting never fails the operation.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: CrudEvent);
}
