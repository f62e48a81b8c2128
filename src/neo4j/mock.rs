//! In-memory mock implementation of EntityStore for testing.
//!
//! All entities live in one `tokio::sync::RwLock<HashMap<Uuid, EntityNode>>`;
//! timers, time entries and comments sit beside them in `CollabState`.
//! `apply` works on copies of both and swaps them in only when every mutation
//! succeeded, which mirrors a rolled-back transaction.
//! Conditionally compiled with `#[cfg(test)]`.

use crate::collab::TimeTracker;
use crate::hierarchy::ordering::ContainerScope;
use crate::neo4j::models::*;
use crate::neo4j::traits::EntityStore;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Collaborator rows that share the entity store's transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollabState {
    /// Running timer per user: target and start time
    pub active_timers: HashMap<Uuid, (EntityRef, DateTime<Utc>)>,
    /// Recorded time entries: target and duration in seconds
    pub time_entries: Vec<(EntityRef, i64)>,
    /// Live comment count per target
    pub live_comments: HashMap<EntityRef, usize>,
}

/// In-memory mock implementation of EntityStore for testing.
pub struct MockEntityStore {
    pub entities: RwLock<HashMap<Uuid, EntityNode>>,
    pub collab: RwLock<CollabState>,
    /// Fail the next `apply` when it reaches this mutation index
    fail_at: RwLock<Option<usize>>,
    applied: AtomicUsize,
}

impl MockEntityStore {
    /// Create a new empty MockEntityStore.
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            collab: RwLock::new(CollabState::default()),
            fail_at: RwLock::new(None),
            applied: AtomicUsize::new(0),
        }
    }

    /// Seed one entity
    pub fn with_entity(mut self, entity: EntityNode) -> Self {
        self.entities.get_mut().insert(entity.id, entity);
        self
    }

    /// Seed a historical time entry on `target`
    pub fn with_time_entry(mut self, target: EntityRef) -> Self {
        self.collab.get_mut().time_entries.push((target, 60));
        self
    }

    /// Seed a timer for `user` on `target`, running for half an hour
    pub fn with_active_timer(mut self, user: Uuid, target: EntityRef) -> Self {
        self.collab
            .get_mut()
            .active_timers
            .insert(user, (target, Utc::now() - Duration::minutes(30)));
        self
    }

    /// Seed `count` live comments on `target`
    pub fn with_comments(mut self, target: EntityRef, count: usize) -> Self {
        self.collab.get_mut().live_comments.insert(target, count);
        self
    }

    /// Make the next `apply` fail when it reaches mutation `index`
    pub async fn fail_on_mutation(&self, index: usize) {
        *self.fail_at.write().await = Some(index);
    }

    /// Number of successful `apply` calls
    pub fn apply_count(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    /// Raw lookup, any kind, any lifecycle
    pub async fn entity(&self, id: Uuid) -> Option<EntityNode> {
        self.entities.read().await.get(&id).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<Uuid, EntityNode> {
        self.entities.read().await.clone()
    }

    pub async fn collab_snapshot(&self) -> CollabState {
        self.collab.read().await.clone()
    }

    pub async fn live_comments(&self, target: EntityRef) -> usize {
        self.collab
            .read()
            .await
            .live_comments
            .get(&target)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for MockEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

/// IDs among `ids` that exist with the given kind
fn of_kind(entities: &HashMap<Uuid, EntityNode>, kind: EntityKind, ids: &[Uuid]) -> Vec<Uuid> {
    ids.iter()
        .filter_map(|id| entities.get(id).filter(|e| e.kind == kind).map(|e| e.id))
        .collect()
}

/// Apply one mutation to the working copies
fn apply_mutation(
    entities: &mut HashMap<Uuid, EntityNode>,
    collab: &mut CollabState,
    mutation: &Mutation,
) -> Result<()> {
    match mutation {
        Mutation::Insert(node) => {
            if entities.contains_key(&node.id) {
                bail!("{} {} already exists", node.kind, node.id);
            }
            entities.insert(node.id, node.clone());
        }
        Mutation::Replace(node) => {
            let slot = entities
                .get_mut(&node.id)
                .filter(|e| e.kind == node.kind)
                .ok_or_else(|| anyhow!("{} {} does not exist", node.kind, node.id))?;
            *slot = node.clone();
        }
        Mutation::SetMode { kind, ids, mode_id } => {
            for id in of_kind(entities, *kind, ids) {
                if let Some(e) = entities.get_mut(&id) {
                    e.mode_id = Some(*mode_id);
                }
            }
        }
        Mutation::Regroup {
            kind,
            ids,
            mode_id,
            containment,
        } => {
            for id in of_kind(entities, *kind, ids) {
                if let Some(e) = entities.get_mut(&id) {
                    e.mode_id = Some(*mode_id);
                    e.containment = *containment;
                }
            }
        }
        Mutation::Schedule {
            kind,
            ids,
            due_date,
            due_time,
        } => {
            for id in of_kind(entities, *kind, ids) {
                if let Some(e) = entities.get_mut(&id) {
                    if let Some(date) = due_date {
                        e.due_date = *date;
                    }
                    if let Some(time) = due_time {
                        e.due_time = *time;
                    }
                }
            }
        }
        Mutation::SetPositions { kind, positions } => {
            for (id, position) in positions {
                if let Some(e) = entities.get_mut(id).filter(|e| e.kind == *kind) {
                    e.position = *position;
                }
            }
        }
        Mutation::Archive {
            kind,
            id,
            archived_at,
        } => {
            let e = entities
                .get_mut(id)
                .filter(|e| e.kind == *kind)
                .ok_or_else(|| anyhow!("{} {} does not exist", kind, id))?;
            e.is_completed = true;
            e.lifecycle = Lifecycle::Archived {
                archived_at: *archived_at,
            };
        }
        Mutation::Delete { kind, id } => {
            if entities.get(id).filter(|e| e.kind == *kind).is_none() {
                bail!("{} {} does not exist", kind, id);
            }
            entities.remove(id);
            for (child_kind, field) in kind.referrers() {
                for e in entities.values_mut() {
                    if e.kind == child_kind && e.containment_value(field) == Some(*id) {
                        e.containment = None;
                    }
                }
            }
        }
        Mutation::StopTimer {
            user_id,
            target,
            stopped_at,
        } => {
            let running = collab
                .active_timers
                .get(user_id)
                .is_some_and(|(on, _)| on == target);
            if running {
                if let Some((_, started_at)) = collab.active_timers.remove(user_id) {
                    let seconds = (*stopped_at - started_at).num_seconds().max(1);
                    collab.time_entries.push((*target, seconds));
                }
            }
        }
        Mutation::SoftDeleteComments { target, .. } => {
            collab.live_comments.remove(target);
        }
    }
    Ok(())
}

#[async_trait]
impl EntityStore for MockEntityStore {
    async fn get_entity(
        &self,
        kind: EntityKind,
        id: Uuid,
        visibility: Visibility,
    ) -> Result<Option<EntityNode>> {
        Ok(self
            .entities
            .read()
            .await
            .get(&id)
            .filter(|e| e.kind == kind && visibility.admits(&e.lifecycle))
            .cloned())
    }

    async fn get_owned(
        &self,
        kind: EntityKind,
        ids: &[Uuid],
        owner: Uuid,
        visibility: Visibility,
    ) -> Result<Vec<EntityNode>> {
        let entities = self.entities.read().await;
        let mut seen = std::collections::HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| entities.get(id))
            .filter(|e| e.kind == kind && e.user_id == owner && visibility.admits(&e.lifecycle))
            .cloned()
            .collect())
    }

    async fn max_position(&self, scope: &ContainerScope) -> Result<Option<i64>> {
        Ok(self
            .entities
            .read()
            .await
            .values()
            .filter(|e| scope.matches(e))
            .map(|e| e.position)
            .max())
    }

    async fn list_scope(
        &self,
        scope: &ContainerScope,
        owner: Option<Uuid>,
    ) -> Result<Vec<EntityNode>> {
        let mut members: Vec<EntityNode> = self
            .entities
            .read()
            .await
            .values()
            .filter(|e| scope.matches(e) && owner.map_or(true, |o| e.user_id == o))
            .cloned()
            .collect();
        members.sort_by_key(|e| (e.position, e.id));
        Ok(members)
    }

    async fn child_ids(
        &self,
        kind: EntityKind,
        field: ContainmentField,
        parent_ids: &[Uuid],
    ) -> Result<Vec<Uuid>> {
        Ok(self
            .entities
            .read()
            .await
            .values()
            .filter(|e| e.kind == kind)
            .filter(|e| {
                e.containment_value(field)
                    .is_some_and(|p| parent_ids.contains(&p))
            })
            .map(|e| e.id)
            .collect())
    }

    async fn apply(&self, changes: &ChangeSet) -> Result<()> {
        let fail_at = self.fail_at.write().await.take();
        let mut entities = self.entities.write().await;
        let mut collab = self.collab.write().await;
        let mut working = entities.clone();
        let mut working_collab = collab.clone();

        for (index, mutation) in changes.iter().enumerate() {
            if fail_at == Some(index) {
                bail!("injected failure at mutation {}", index);
            }
            apply_mutation(&mut working, &mut working_collab, mutation)?;
        }

        *entities = working;
        *collab = working_collab;
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TimeTracker for MockEntityStore {
    async fn timer_running_on(&self, user: Uuid, target: EntityRef) -> Result<bool> {
        Ok(self
            .collab
            .read()
            .await
            .active_timers
            .get(&user)
            .is_some_and(|(on, _)| *on == target))
    }

    async fn has_time_entries(&self, target: EntityRef) -> Result<bool> {
        Ok(self
            .collab
            .read()
            .await
            .time_entries
            .iter()
            .any(|(on, _)| *on == target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[tokio::test]
    async fn test_failed_apply_leaves_store_untouched() {
        let user = Uuid::new_v4();
        let mode = Uuid::new_v4();
        let task = test_task(user, mode);
        let store = MockEntityStore::new().with_entity(task.clone());
        let before = store.snapshot().await;

        store.fail_on_mutation(1).await;
        let changes = ChangeSet::from(vec![
            Mutation::SetMode {
                kind: EntityKind::Task,
                ids: vec![task.id],
                mode_id: Uuid::new_v4(),
            },
            Mutation::Delete {
                kind: EntityKind::Task,
                id: task.id,
            },
        ]);
        assert!(store.apply(&changes).await.is_err());
        assert_eq!(store.snapshot().await, before);
        assert_eq!(store.apply_count(), 0);

        // Failure is one-shot
        store.apply(&changes).await.unwrap();
        assert!(store.entity(task.id).await.is_none());
    }

    #[tokio::test]
    async fn test_stop_timer_only_closes_matching_target() {
        let user = Uuid::new_v4();
        let task = EntityRef::new(EntityKind::Task, Uuid::new_v4());
        let other = EntityRef::new(EntityKind::Task, Uuid::new_v4());
        let store = MockEntityStore::new().with_active_timer(user, task);

        let stop = |target: EntityRef| Mutation::StopTimer {
            user_id: user,
            target,
            stopped_at: Utc::now(),
        };
        store.apply(&ChangeSet::from(vec![stop(other)])).await.unwrap();
        assert!(store.timer_running_on(user, task).await.unwrap());
        assert!(!store.has_time_entries(task).await.unwrap());

        // A second close of the same timer records nothing
        store
            .apply(&ChangeSet::from(vec![stop(task), stop(task)]))
            .await
            .unwrap();
        let collab = store.collab_snapshot().await;
        assert!(collab.active_timers.is_empty());
        assert_eq!(collab.time_entries.len(), 1);
        assert!(collab.time_entries[0].1 >= 1800);
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_timers_and_comments() {
        let user = Uuid::new_v4();
        let task = test_task(user, Uuid::new_v4());
        let target = task.entity_ref();
        let store = MockEntityStore::new()
            .with_entity(task.clone())
            .with_active_timer(user, target)
            .with_comments(target, 3);
        let before = store.collab_snapshot().await;

        store.fail_on_mutation(2).await;
        let now = Utc::now();
        let changes = ChangeSet::from(vec![
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
            Mutation::Delete {
                kind: EntityKind::Task,
                id: task.id,
            },
        ]);
        assert!(store.apply(&changes).await.is_err());
        assert_eq!(store.collab_snapshot().await, before);
        assert_eq!(store.live_comments(target).await, 3);
        assert!(store.entity(task.id).await.is_some());
    }

    #[tokio::test]
    async fn test_delete_nulls_children() {
        let user = Uuid::new_v4();
        let mode = Uuid::new_v4();
        let project = test_project(user, mode);
        let sub = contained(test_project(user, mode), ContainmentField::Parent, project.id);
        let task = contained(test_task(user, mode), ContainmentField::Project, project.id);
        let store = MockEntityStore::new()
            .with_entity(project.clone())
            .with_entity(sub.clone())
            .with_entity(task.clone());

        store
            .apply(&ChangeSet::from(vec![Mutation::Delete {
                kind: EntityKind::Project,
                id: project.id,
            }]))
            .await
            .unwrap();

        let sub = store.entity(sub.id).await.unwrap();
        assert_eq!(sub.containment, None);
        assert_eq!(sub.mode_id, Some(mode));
        assert_eq!(store.entity(task.id).await.unwrap().containment, None);
    }

    #[tokio::test]
    async fn test_get_owned_skips_foreign_and_wrong_kind() {
        let user = Uuid::new_v4();
        let mode = Uuid::new_v4();
        let mine = test_task(user, mode);
        let theirs = test_task(Uuid::new_v4(), mode);
        let milestone = test_milestone(user, mode);
        let store = MockEntityStore::new()
            .with_entity(mine.clone())
            .with_entity(theirs.clone())
            .with_entity(milestone.clone());

        let found = store
            .get_owned(
                EntityKind::Task,
                &[mine.id, theirs.id, milestone.id, Uuid::new_v4()],
                user,
                Visibility::Active,
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, mine.id);
    }
}
