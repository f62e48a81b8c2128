//! Hierarchy operations
//!
//! Every operation takes the acting user explicitly, validates before touching
//! storage, and commits its writes as one `ChangeSet`.

use super::archive::destroy_or_archive;
use super::cascade::cascade_mode;
use super::models::*;
use super::ordering::{assign_end_position, container_changed, reorder_scope, ContainerScope};
use super::validation::{at_most_one, check_mode_matches, check_no_cycle, resolve_ancestor};
use crate::collab::{AccessControl, TimeTracker};
use crate::error::{OrchestratorError, Result};
use crate::events::{CrudAction, CrudEvent, EntityType, EventEmitter};
use crate::neo4j::models::*;
use crate::neo4j::traits::EntityStore;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Manager for hierarchy operations
pub struct HierarchyManager {
    pub(super) store: Arc<dyn EntityStore>,
    pub(super) timers: Arc<dyn TimeTracker>,
    pub(super) access: Arc<dyn AccessControl>,
    event_emitter: Option<Arc<dyn EventEmitter>>,
}

impl HierarchyManager {
    /// Create a new HierarchyManager
    pub fn new(
        store: Arc<dyn EntityStore>,
        timers: Arc<dyn TimeTracker>,
        access: Arc<dyn AccessControl>,
    ) -> Self {
        Self {
            store,
            timers,
            access,
            event_emitter: None,
        }
    }

    /// Attach an event emitter (builder pattern)
    pub fn with_event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.event_emitter = Some(emitter);
        self
    }

    pub(super) fn emit(&self, event: CrudEvent) {
        if let Some(emitter) = &self.event_emitter {
            emitter.emit(event);
        }
    }

    fn emit_entity(&self, action: CrudAction, entity: &EntityNode) {
        let mut event = CrudEvent::new(entity.kind.into(), action, entity.id.to_string())
            .with_payload(serde_json::to_value(entity).unwrap_or(serde_json::Value::Null));
        if let Some(mode_id) = entity.mode_id {
            event = event.with_mode_id(mode_id.to_string());
        }
        self.emit(event);
    }

    // ========================================================================
    // Shared steps
    // ========================================================================

    /// Load an entity owned by `user`, or NotFound
    pub(super) async fn load_owned(
        &self,
        user: Uuid,
        kind: EntityKind,
        id: Uuid,
        visibility: Visibility,
    ) -> Result<EntityNode> {
        self.store
            .get_entity(kind, id, visibility)
            .await?
            .filter(|entity| entity.user_id == user)
            .ok_or_else(|| OrchestratorError::not_found(kind, id))
    }

    /// The user must own or edit the target mode
    pub(super) async fn ensure_writable(&self, user: Uuid, mode_id: Uuid) -> Result<()> {
        let writable = self.access.mode_ids_writable_by(user).await?;
        if writable.contains(&mode_id) {
            return Ok(());
        }
        warn!(user_id = %user, mode_id = %mode_id, "Rejected write into foreign mode");
        Err(OrchestratorError::validation(
            "mode_id",
            "mode not owned by user",
        ))
    }

    /// Stop timer, then hide comments, then archive or delete.
    ///
    /// Only plans the writes; the caller commits them with the rest of its
    /// change set so a failed commit leaves timers and comments untouched.
    pub(super) async fn retire(
        &self,
        user: Uuid,
        entity: &EntityNode,
        now: DateTime<Utc>,
    ) -> Result<(Disposition, Vec<Mutation>)> {
        let target = entity.entity_ref();
        let closing_timer = self.timers.timer_running_on(user, target).await?;
        let (disposition, removal) =
            destroy_or_archive(self.timers.as_ref(), entity, closing_timer, now).await?;
        debug!(entity = %target, closing_timer, ?disposition, "Planned removal");

        Ok((
            disposition,
            vec![
                Mutation::StopTimer {
                    user_id: user,
                    target,
                    stopped_at: now,
                },
                Mutation::SoftDeleteComments {
                    user_id: user,
                    target,
                    deleted_at: now,
                },
                removal,
            ],
        ))
    }

    /// Apply a change set atomically
    pub(super) async fn commit(&self, changes: &ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.store.apply(changes).await {
            error!(error = ?e, mutations = changes.len(), "Transaction failed and was rolled back");
            return Err(e.into());
        }
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Get one of the user's entities in the given view
    pub async fn get_entity(
        &self,
        user: Uuid,
        kind: EntityKind,
        id: Uuid,
        visibility: Visibility,
    ) -> Result<EntityNode> {
        self.load_owned(user, kind, id, visibility).await
    }

    /// The user's members of a scope, ordered by (position, id)
    pub async fn list_scope(&self, user: Uuid, scope: &ContainerScope) -> Result<Vec<EntityNode>> {
        Ok(self.store.list_scope(scope, Some(user)).await?)
    }

    // ========================================================================
    // Create / update / remove
    // ========================================================================

    /// Create an entity at the end of its container scope
    pub async fn create_entity(
        &self,
        user: Uuid,
        kind: EntityKind,
        req: CreateEntityRequest,
    ) -> Result<EntityNode> {
        if req.title.trim().is_empty() {
            return Err(OrchestratorError::validation("title", "title may not be blank"));
        }
        let containment = at_most_one(kind, &req.containment)?;
        let ancestor = match containment {
            Some(link) => Some(resolve_ancestor(self.store.as_ref(), user, kind, link).await?),
            None => None,
        };

        let mode_id = req
            .mode_id
            .or_else(|| ancestor.as_ref().and_then(|a| a.mode_id))
            .ok_or_else(|| {
                OrchestratorError::validation("mode_id", format!("a {} needs a mode", kind))
            })?;
        self.ensure_writable(user, mode_id).await?;
        if let Some(ancestor) = &ancestor {
            check_mode_matches(Some(mode_id), ancestor)?;
        }

        let position =
            assign_end_position(self.store.as_ref(), kind, Some(mode_id), containment).await?;

        let mut entity = EntityNode::new(kind, req.title, user, Some(mode_id));
        entity.description = req.description;
        entity.is_completed = req.is_completed;
        entity.due_date = req.due_date;
        entity.due_time = req.due_time;
        entity.assigned_to = req.assigned_to;
        entity.containment = containment;
        entity.position = position;

        self.commit(&ChangeSet::from(vec![Mutation::Insert(entity.clone())]))
            .await?;
        info!(entity = %entity.entity_ref(), position, "Entity created");
        self.emit_entity(CrudAction::Created, &entity);
        Ok(entity)
    }

    /// Update an entity. Repositions on container change; cascades on mode change.
    pub async fn update_entity(
        &self,
        user: Uuid,
        kind: EntityKind,
        id: Uuid,
        req: UpdateEntityRequest,
    ) -> Result<EntityNode> {
        let current = self.load_owned(user, kind, id, Visibility::Active).await?;

        if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(OrchestratorError::validation("title", "title may not be blank"));
        }
        let merged = req.merge_containment(ContainmentInput::from_link(current.containment));
        let containment = at_most_one(kind, &merged)?;
        let mode_id = req.mode_id.or(current.mode_id);
        let mode_changed = mode_id != current.mode_id;

        if let (true, Some(mode_id)) = (mode_changed, mode_id) {
            self.ensure_writable(user, mode_id).await?;
        }
        if let Some(link) = containment {
            let ancestor = resolve_ancestor(self.store.as_ref(), user, kind, link).await?;
            check_mode_matches(mode_id, &ancestor)?;
            if link.field == ContainmentField::Parent && current.containment != containment {
                check_no_cycle(self.store.as_ref(), &[current.id], &ancestor).await?;
            }
        }

        let mut updated = current.clone();
        if let Some(title) = req.title {
            updated.title = title;
        }
        if let Some(description) = req.description {
            updated.description = description;
        }
        if let Some(is_completed) = req.is_completed {
            updated.is_completed = is_completed;
        }
        if let Some(due_date) = req.due_date {
            updated.due_date = due_date;
        }
        if let Some(due_time) = req.due_time {
            updated.due_time = due_time;
        }
        if let Some(assigned_to) = req.assigned_to {
            updated.assigned_to = assigned_to;
        }
        updated.mode_id = mode_id;
        updated.containment = containment;

        if container_changed(&current, mode_id, containment) {
            updated.position =
                assign_end_position(self.store.as_ref(), kind, mode_id, containment).await?;
            debug!(entity = %updated.entity_ref(), position = updated.position, "Repositioned after container change");
        }

        let completed = !current.is_completed && updated.is_completed;
        let mut changes = ChangeSet::new();
        changes.push(Mutation::Replace(updated.clone()));
        if completed {
            changes.push(Mutation::StopTimer {
                user_id: user,
                target: updated.entity_ref(),
                stopped_at: Utc::now(),
            });
        }
        if let (true, Some(mode_id)) = (mode_changed, mode_id) {
            changes.extend(cascade_mode(self.store.as_ref(), updated.entity_ref(), mode_id).await?);
        }
        self.commit(&changes).await?;
        info!(
            entity = %updated.entity_ref(),
            mode_changed,
            completed,
            mutations = changes.len(),
            "Entity updated"
        );

        self.emit_entity(CrudAction::Updated, &updated);
        Ok(updated)
    }

    /// Remove an entity: archived if time entries reference it, deleted otherwise
    pub async fn remove_entity(
        &self,
        user: Uuid,
        kind: EntityKind,
        id: Uuid,
    ) -> Result<RemovalOutcome> {
        let entity = self.load_owned(user, kind, id, Visibility::Active).await?;
        let (disposition, mutations) = self.retire(user, &entity, Utc::now()).await?;
        self.commit(&ChangeSet::from(mutations)).await?;

        info!(entity = %entity.entity_ref(), ?disposition, "Entity removed");
        let action = match disposition {
            Disposition::Archived => CrudAction::Archived,
            Disposition::Deleted => CrudAction::Deleted,
        };
        self.emit_entity(action, &entity);

        Ok(RemovalOutcome {
            kind,
            id,
            disposition,
        })
    }

    // ========================================================================
    // Reordering
    // ========================================================================

    /// Overwrite positions inside one scope. Ids outside the scope or not owned
    /// are ignored; a repeated id keeps its last position.
    pub async fn reorder_in_scope(
        &self,
        user: Uuid,
        kind: EntityKind,
        mode_id: Uuid,
        descriptor: ScopeDescriptor,
        changes: Vec<PositionChange>,
    ) -> Result<Vec<PositionChange>> {
        let scope = reorder_scope(kind, mode_id, &descriptor)?;
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let members: HashSet<Uuid> = self
            .store
            .list_scope(&scope, Some(user))
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();
        let requested = changes.len();
        let mut seen = HashSet::new();
        let mut updated: Vec<PositionChange> = changes
            .into_iter()
            .rev()
            .filter(|change| members.contains(&change.id) && seen.insert(change.id))
            .collect();
        updated.reverse();
        if updated.len() < requested {
            debug!(
                kind = %kind,
                ignored = requested - updated.len(),
                "Ignored repeated reorder ids or ids outside scope"
            );
        }
        if updated.is_empty() {
            return Ok(updated);
        }

        self.commit(&ChangeSet::from(vec![Mutation::SetPositions {
            kind,
            positions: updated.iter().map(|c| (c.id, c.position)).collect(),
        }]))
        .await?;
        info!(kind = %kind, count = updated.len(), "Scope reordered");

        self.emit(
            CrudEvent::new(EntityType::from(kind), CrudAction::Reordered, "")
                .with_payload(serde_json::json!({ "updated": updated }))
                .with_mode_id(mode_id.to_string()),
        );
        Ok(updated)
    }
}
