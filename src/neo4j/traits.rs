//! EntityStore trait definition
//!
//! Abstract interface over the hierarchy storage. Implemented by `Neo4jClient`
//! and, in tests, by the in-memory `MockEntityStore`.

use crate::hierarchy::ordering::ContainerScope;
use crate::neo4j::models::*;
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Scoped reads plus one atomic write entry point
#[async_trait]
pub trait EntityStore: Send + Sync {
    // ========================================================================
    // Reads
    // ========================================================================

    /// Get an entity of the given kind by ID, if visible in the given view
    async fn get_entity(
        &self,
        kind: EntityKind,
        id: Uuid,
        visibility: Visibility,
    ) -> Result<Option<EntityNode>>;

    /// Get the entities among `ids` that belong to `owner`. Unknown or foreign ids are skipped.
    async fn get_owned(
        &self,
        kind: EntityKind,
        ids: &[Uuid],
        owner: Uuid,
        visibility: Visibility,
    ) -> Result<Vec<EntityNode>>;

    /// Highest position among the members of a scope
    async fn max_position(&self, scope: &ContainerScope) -> Result<Option<i64>>;

    /// Members of a scope ordered by (position, id), optionally restricted to one owner
    async fn list_scope(
        &self,
        scope: &ContainerScope,
        owner: Option<Uuid>,
    ) -> Result<Vec<EntityNode>>;

    /// IDs of `kind` entities whose `field` points at any of `parent_ids`.
    /// Archived entities are always included.
    async fn child_ids(
        &self,
        kind: EntityKind,
        field: ContainmentField,
        parent_ids: &[Uuid],
    ) -> Result<Vec<Uuid>>;

    // ========================================================================
    // Writes
    // ========================================================================

    /// Apply every mutation in order inside one transaction. On error nothing is persisted.
    async fn apply(&self, changes: &ChangeSet) -> Result<()>;
}
