//! External collaborators consumed by the hierarchy core
//!
//! - `TimeTracker`: active timers and recorded time entries
//! - `AccessControl`: which modes a user may write into
//!
//! Both are read-only here. Closing a timer and hiding comments are
//! `Mutation::StopTimer` / `Mutation::SoftDeleteComments`, committed in the
//! same transaction as the entity change they accompany.
//!
//! `Neo4jClient` implements both; tests use the in-memory mocks.

use crate::neo4j::models::EntityRef;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

#[cfg(test)]
pub(crate) mod mock;

/// Time-tracking subsystem
#[async_trait]
pub trait TimeTracker: Send + Sync {
    /// Whether the user's running timer points at `target`
    async fn timer_running_on(&self, user: Uuid, target: EntityRef) -> Result<bool>;

    /// Whether any recorded time entry references `target` directly
    async fn has_time_entries(&self, target: EntityRef) -> Result<bool>;
}

/// Ownership/collaboration subsystem
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Modes the user owns or edits as a collaborator
    async fn mode_ids_writable_by(&self, user: Uuid) -> Result<HashSet<Uuid>>;
}
