//! Test helper factories and mock state builders
//!
//! Provides convenience functions for creating entities with sensible defaults,
//! and a harness wiring a `HierarchyManager` to in-memory backends.
#![allow(dead_code)]

use crate::collab::mock::MockAccessControl;
use crate::events::EventBus;
use crate::hierarchy::HierarchyManager;
use crate::neo4j::mock::MockEntityStore;
use crate::neo4j::models::*;
use crate::{AppState, Config};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Entity factories
// ============================================================================

pub fn test_goal(user: Uuid, mode: Uuid) -> EntityNode {
    EntityNode::new(EntityKind::Goal, "Ship v2".into(), user, Some(mode))
}

pub fn test_project(user: Uuid, mode: Uuid) -> EntityNode {
    EntityNode::new(EntityKind::Project, "Storage rewrite".into(), user, Some(mode))
}

pub fn test_milestone(user: Uuid, mode: Uuid) -> EntityNode {
    EntityNode::new(EntityKind::Milestone, "Beta".into(), user, Some(mode))
}

pub fn test_task(user: Uuid, mode: Uuid) -> EntityNode {
    EntityNode::new(EntityKind::Task, "Write migration".into(), user, Some(mode))
}

/// Set the entity's single containment link
pub fn contained(mut node: EntityNode, field: ContainmentField, id: Uuid) -> EntityNode {
    node.containment = Some(ContainmentLink::new(field, id));
    node
}

pub fn archived(mut node: EntityNode) -> EntityNode {
    node.is_completed = true;
    node.lifecycle = Lifecycle::Archived {
        archived_at: Utc::now(),
    };
    node
}

pub fn at_position(mut node: EntityNode, position: i64) -> EntityNode {
    node.position = position;
    node
}

// ============================================================================
// Mock state builders
// ============================================================================

pub fn test_config() -> Config {
    Config {
        neo4j_uri: "bolt://mock:7687".to_string(),
        neo4j_user: "neo4j".to_string(),
        neo4j_password: "mock".to_string(),
        log_filter: "info".to_string(),
        log_json: false,
        event_capacity: 16,
    }
}

/// In-memory backends plus a manager wired to them.
///
/// The store doubles as the time tracker, as `Neo4jClient` does.
pub struct TestHarness {
    pub user: Uuid,
    pub mode: Uuid,
    pub store: Arc<MockEntityStore>,
    pub access: Arc<MockAccessControl>,
    pub events: EventBus,
}

impl TestHarness {
    /// One user owning one writable mode, empty store
    pub fn new() -> Self {
        let user = Uuid::new_v4();
        let mode = Uuid::new_v4();
        Self::with_store(user, mode, MockEntityStore::new())
    }

    pub fn with_store(user: Uuid, mode: Uuid, store: MockEntityStore) -> Self {
        Self {
            user,
            mode,
            store: Arc::new(store),
            access: Arc::new(MockAccessControl::new().with_mode(user, mode)),
            events: EventBus::default(),
        }
    }

    pub fn with_access(mut self, access: MockAccessControl) -> Self {
        self.access = Arc::new(access);
        self
    }

    pub fn manager(&self) -> HierarchyManager {
        HierarchyManager::new(self.store.clone(), self.store.clone(), self.access.clone())
        .with_event_emitter(Arc::new(self.events.clone()))
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            store: self.store.clone(),
            timers: self.store.clone(),
            access: self.access.clone(),
            events: self.events.clone(),
            config: Arc::new(test_config()),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
