//! Collaborator trait implementations for `Neo4jClient`.
//!
//! Timers, comments and mode access live in the same graph as the hierarchy.

use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

use super::client::Neo4jClient;
use super::models::EntityRef;
use crate::collab::{AccessControl, TimeTracker};

#[async_trait]
impl TimeTracker for Neo4jClient {
    async fn timer_running_on(&self, user: Uuid, target: EntityRef) -> anyhow::Result<bool> {
        self.timer_running_on(user, target).await
    }

    async fn has_time_entries(&self, target: EntityRef) -> anyhow::Result<bool> {
        self.has_time_entries(target).await
    }
}

#[async_trait]
impl AccessControl for Neo4jClient {
    async fn mode_ids_writable_by(&self, user: Uuid) -> anyhow::Result<HashSet<Uuid>> {
        self.mode_ids_writable_by(user).await
    }
}
