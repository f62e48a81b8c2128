//! Archive/delete guard
//!
//! Removal keeps an entity's row when time entries point at it and drops it
//! otherwise. Only direct references on the entity itself are checked. A
//! timer closed in the same change set counts, since it becomes an entry.

use super::models::Disposition;
use crate::collab::TimeTracker;
use crate::error::Result;
use crate::neo4j::models::{EntityNode, Mutation};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Decide how `entity` leaves the store and return the matching mutation
pub async fn destroy_or_archive(
    timers: &dyn TimeTracker,
    entity: &EntityNode,
    closing_timer: bool,
    now: DateTime<Utc>,
) -> Result<(Disposition, Mutation)> {
    let referenced = closing_timer || timers.has_time_entries(entity.entity_ref()).await?;
    debug!(entity = %entity.entity_ref(), referenced, closing_timer, "Archive guard decision");

    if referenced {
        Ok((
            Disposition::Archived,
            Mutation::Archive {
                kind: entity.kind,
                id: entity.id,
                archived_at: now,
            },
        ))
    } else {
        Ok((
            Disposition::Deleted,
            Mutation::Delete {
                kind: entity.kind,
                id: entity.id,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neo4j::mock::MockEntityStore;
    use crate::neo4j::models::{ChangeSet, ContainmentField, EntityKind, Visibility};
    use crate::neo4j::traits::EntityStore;
    use crate::test_helpers::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_unreferenced_entity_is_deleted() {
        let task = test_task(Uuid::new_v4(), Uuid::new_v4());
        let store = MockEntityStore::new().with_entity(task.clone());

        let (disposition, mutation) = destroy_or_archive(&store, &task, false, Utc::now())
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Deleted);

        store.apply(&ChangeSet::from(vec![mutation])).await.unwrap();
        let gone = store
            .get_entity(EntityKind::Task, task.id, Visibility::All)
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_referenced_entity_is_archived_and_completed() {
        let project = test_project(Uuid::new_v4(), Uuid::new_v4());
        let store = MockEntityStore::new()
            .with_entity(project.clone())
            .with_time_entry(project.entity_ref());
        let now = Utc::now();

        let (disposition, mutation) = destroy_or_archive(&store, &project, false, now)
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Archived);

        store.apply(&ChangeSet::from(vec![mutation])).await.unwrap();
        let kept = store
            .get_entity(EntityKind::Project, project.id, Visibility::All)
            .await
            .unwrap()
            .unwrap();
        assert!(kept.is_completed);
        assert_eq!(kept.lifecycle.archived_at(), Some(now));
        assert!(store
            .get_entity(EntityKind::Project, project.id, Visibility::Active)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_descendant_time_entries_do_not_count() {
        let user = Uuid::new_v4();
        let mode = Uuid::new_v4();
        let milestone = test_milestone(user, mode);
        let task = contained(test_task(user, mode), ContainmentField::Milestone, milestone.id);
        let store = MockEntityStore::new().with_time_entry(task.entity_ref());

        let (disposition, _) = destroy_or_archive(&store, &milestone, false, Utc::now())
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Deleted);
    }

    #[tokio::test]
    async fn test_closing_timer_counts_as_history() {
        let task = test_task(Uuid::new_v4(), Uuid::new_v4());
        let store = MockEntityStore::new();

        let (disposition, mutation) = destroy_or_archive(&store, &task, true, Utc::now())
            .await
            .unwrap();
        assert_eq!(disposition, Disposition::Archived);
        assert!(matches!(mutation, Mutation::Archive { id, .. } if id == task.id));
    }
}
