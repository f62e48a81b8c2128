//! Batch operations over a mixed selection
//!
//! Each operation loads only the caller's own entities, builds every write
//! into one `ChangeSet` and commits it once. Ids that are missing, foreign or
//! of the wrong lifecycle are skipped silently and do not count.

use super::manager::HierarchyManager;
use super::models::{BatchCounts, Disposition, SchedulePayload, Selection};
use super::validation::check_no_cycle;
use crate::error::{OrchestratorError, Result};
use crate::events::{CrudAction, CrudEvent, EntityType};
use crate::neo4j::models::*;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

impl HierarchyManager {
    /// Selected entities of one kind owned by `user`
    async fn owned(
        &self,
        user: Uuid,
        selection: &Selection,
        kind: EntityKind,
        visibility: Visibility,
    ) -> Result<Vec<EntityNode>> {
        let ids = selection.ids(kind);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.get_owned(kind, ids, user, visibility).await?)
    }

    fn emit_batch(&self, kind: EntityKind, action: CrudAction, ids: &[Uuid]) {
        if ids.is_empty() {
            return;
        }
        self.emit(
            CrudEvent::new(EntityType::from(kind), action, "")
                .with_payload(serde_json::json!({ "ids": ids })),
        );
    }

    /// Retire every selected entity in `visibility`, leaves first, in one commit
    async fn retire_selection(
        &self,
        user: Uuid,
        selection: &Selection,
        visibility: Visibility,
    ) -> Result<BatchCounts> {
        selection.validate()?;
        let now = Utc::now();
        let mut changes = ChangeSet::new();
        let mut counts = BatchCounts::default();
        let mut retired = Vec::new();

        for kind in EntityKind::LEAVES_FIRST {
            for entity in self.owned(user, selection, kind, visibility).await? {
                let (disposition, mutations) = self.retire(user, &entity, now).await?;
                changes.extend(mutations);
                counts.add(kind, 1);
                retired.push((kind, entity.id, disposition));
            }
        }

        self.commit(&changes).await?;

        for kind in EntityKind::LEAVES_FIRST {
            for disposition in [Disposition::Archived, Disposition::Deleted] {
                let ids: Vec<Uuid> = retired
                    .iter()
                    .filter(|(k, _, d)| *k == kind && *d == disposition)
                    .map(|(_, id, _)| *id)
                    .collect();
                let action = match disposition {
                    Disposition::Archived => CrudAction::Archived,
                    Disposition::Deleted => CrudAction::Deleted,
                };
                self.emit_batch(kind, action, &ids);
            }
        }
        Ok(counts)
    }

    /// Complete (archive or delete) every selected active entity
    pub async fn batch_complete(&self, user: Uuid, selection: &Selection) -> Result<BatchCounts> {
        let counts = self
            .retire_selection(user, selection, Visibility::Active)
            .await?;
        info!(user_id = %user, total = counts.total(), "Batch complete");
        Ok(counts)
    }

    /// Remove every selected entity, archived ones included
    pub async fn batch_delete(&self, user: Uuid, selection: &Selection) -> Result<BatchCounts> {
        let counts = self
            .retire_selection(user, selection, Visibility::All)
            .await?;
        info!(user_id = %user, total = counts.total(), "Batch delete");
        Ok(counts)
    }

    /// Move the selection into another mode.
    ///
    /// Non-goal entities lose their containment. Descendants that were not
    /// selected stay where they are.
    pub async fn batch_change_mode(
        &self,
        user: Uuid,
        selection: &Selection,
        mode_id: Uuid,
    ) -> Result<BatchCounts> {
        selection.validate()?;
        self.ensure_writable(user, mode_id).await?;

        let mut changes = ChangeSet::new();
        let mut counts = BatchCounts::default();
        let mut moved = Vec::new();
        for kind in EntityKind::ALL {
            let ids: Vec<Uuid> = self
                .owned(user, selection, kind, Visibility::Active)
                .await?
                .into_iter()
                .map(|e| e.id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            counts.add(kind, ids.len());
            moved.push((kind, ids.clone()));
            changes.push(match kind {
                EntityKind::Goal => Mutation::SetMode { kind, ids, mode_id },
                _ => Mutation::Regroup {
                    kind,
                    ids,
                    mode_id,
                    containment: None,
                },
            });
        }

        self.commit(&changes).await?;
        info!(user_id = %user, mode_id = %mode_id, total = counts.total(), "Batch mode change");
        for (kind, ids) in moved {
            self.emit_batch(kind, CrudAction::Updated, &ids);
        }
        Ok(counts)
    }

    /// Set or clear due date and time on the selection
    pub async fn batch_schedule(
        &self,
        user: Uuid,
        selection: &Selection,
        payload: SchedulePayload,
    ) -> Result<BatchCounts> {
        selection.validate()?;
        if payload.is_empty() {
            debug!(user_id = %user, "Empty schedule payload, nothing to do");
            return Ok(BatchCounts::default());
        }

        let mut changes = ChangeSet::new();
        let mut counts = BatchCounts::default();
        let mut scheduled = Vec::new();
        for kind in EntityKind::ALL {
            let ids: Vec<Uuid> = self
                .owned(user, selection, kind, Visibility::Active)
                .await?
                .into_iter()
                .map(|e| e.id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            counts.add(kind, ids.len());
            scheduled.push((kind, ids.clone()));
            changes.push(Mutation::Schedule {
                kind,
                ids,
                due_date: payload.due_date,
                due_time: payload.due_time,
            });
        }

        self.commit(&changes).await?;
        info!(user_id = %user, total = counts.total(), "Batch schedule");
        for (kind, ids) in scheduled {
            self.emit_batch(kind, CrudAction::Updated, &ids);
        }
        Ok(counts)
    }

    /// Place the selection under one parent, adopting the parent's mode.
    ///
    /// Each selected kind uses the field that links it to `parent_kind`; kinds
    /// with no such field are skipped. Goals are never regrouped. Positions are
    /// left as they are.
    pub async fn batch_group_under(
        &self,
        user: Uuid,
        selection: &Selection,
        parent_kind: EntityKind,
        parent_id: Uuid,
    ) -> Result<BatchCounts> {
        selection.validate()?;
        if parent_kind == EntityKind::Task {
            return Err(OrchestratorError::validation(
                "parent_type",
                "invalid parent type",
            ));
        }
        let parent = self
            .load_owned(user, parent_kind, parent_id, Visibility::All)
            .await?;
        let mode_id = parent.mode_id.ok_or_else(|| {
            OrchestratorError::validation("parent_id", "parent has no mode set")
        })?;

        let mut changes = ChangeSet::new();
        let mut counts = BatchCounts::default();
        let mut grouped = Vec::new();
        for kind in [EntityKind::Project, EntityKind::Milestone, EntityKind::Task] {
            let Some(field) = ContainmentField::linking(kind, parent_kind) else {
                continue;
            };
            let ids: Vec<Uuid> = self
                .owned(user, selection, kind, Visibility::Active)
                .await?
                .into_iter()
                .map(|e| e.id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            if field == ContainmentField::Parent {
                check_no_cycle(self.store.as_ref(), &ids, &parent).await?;
            }
            counts.add(kind, ids.len());
            grouped.push((kind, ids.clone()));
            changes.push(Mutation::Regroup {
                kind,
                ids,
                mode_id,
                containment: Some(ContainmentLink::new(field, parent_id)),
            });
        }

        self.commit(&changes).await?;
        info!(
            user_id = %user,
            parent = %parent.entity_ref(),
            total = counts.total(),
            "Batch group under"
        );
        for (kind, ids) in grouped {
            self.emit_batch(kind, CrudAction::Updated, &ids);
        }
        Ok(counts)
    }
}
