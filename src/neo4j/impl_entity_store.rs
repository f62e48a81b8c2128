//! `EntityStore` implementation for `Neo4jClient`.
//!
//! Every method simply delegates to the corresponding inherent method on `Neo4jClient`.

use async_trait::async_trait;
use uuid::Uuid;

use super::client::Neo4jClient;
use super::models::*;
use super::traits::EntityStore;
use crate::hierarchy::ordering::ContainerScope;

#[async_trait]
impl EntityStore for Neo4jClient {
    async fn get_entity(
        &self,
        kind: EntityKind,
        id: Uuid,
        visibility: Visibility,
    ) -> anyhow::Result<Option<EntityNode>> {
        self.get_entity(kind, id, visibility).await
    }

    async fn get_owned(
        &self,
        kind: EntityKind,
        ids: &[Uuid],
        owner: Uuid,
        visibility: Visibility,
    ) -> anyhow::Result<Vec<EntityNode>> {
        self.get_owned(kind, ids, owner, visibility).await
    }

    async fn max_position(&self, scope: &ContainerScope) -> anyhow::Result<Option<i64>> {
        self.max_position(scope).await
    }

    async fn list_scope(
        &self,
        scope: &ContainerScope,
        owner: Option<Uuid>,
    ) -> anyhow::Result<Vec<EntityNode>> {
        self.list_scope(scope, owner).await
    }

    async fn child_ids(
        &self,
        kind: EntityKind,
        field: ContainmentField,
        parent_ids: &[Uuid],
    ) -> anyhow::Result<Vec<Uuid>> {
        self.child_ids(kind, field, parent_ids).await
    }

    async fn apply(&self, changes: &ChangeSet) -> anyhow::Result<()> {
        self.apply_changes(changes).await
    }
}
