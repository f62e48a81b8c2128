//! Ordering engine
//!
//! Every entity sorts inside a container scope: same kind, same mode, same
//! single containment link (or none). New and moved entities go to the end of
//! their scope with a gap of [`POSITION_STEP`] so later insertions between
//! siblings need no renumbering. Duplicate positions are tolerated and broken
//! by id.

use super::models::ScopeDescriptor;
use crate::error::{OrchestratorError, Result};
use crate::neo4j::models::{ContainmentLink, EntityKind, EntityNode};
use crate::neo4j::traits::EntityStore;
use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

/// Gap between consecutive end-of-scope positions
pub const POSITION_STEP: i64 = 1024;

/// What, besides kind and mode, defines a sibling group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKey {
    /// Same containment link, dated or not. Used for position assignment.
    Container(Option<ContainmentLink>),
    /// Same containment link and no due date
    Home(Option<ContainmentLink>),
    /// Due on this date, any containment
    Dated(NaiveDate),
}

/// A sibling group: kind + mode + key. Archived entities are never members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerScope {
    pub kind: EntityKind,
    pub mode_id: Uuid,
    pub key: ScopeKey,
}

impl ContainerScope {
    /// Home and dated task lists only hold open tasks
    pub fn open_only(&self) -> bool {
        self.kind == EntityKind::Task && !matches!(self.key, ScopeKey::Container(_))
    }

    pub fn matches(&self, entity: &EntityNode) -> bool {
        if entity.kind != self.kind
            || entity.mode_id != Some(self.mode_id)
            || entity.is_archived()
            || (self.open_only() && entity.is_completed)
        {
            return false;
        }
        match self.key {
            ScopeKey::Container(link) => entity.containment == link,
            ScopeKey::Home(link) => entity.containment == link && entity.due_date.is_none(),
            ScopeKey::Dated(date) => entity.due_date == Some(date),
        }
    }
}

/// Scope an entity with this kind, mode and containment would be placed in
pub fn compute_scope(
    kind: EntityKind,
    mode_id: Option<Uuid>,
    containment: Option<ContainmentLink>,
) -> Result<ContainerScope> {
    let mode_id = mode_id.ok_or_else(|| {
        OrchestratorError::validation("mode_id", format!("a mode is required to place a {}", kind))
    })?;
    if let Some(link) = containment {
        if !kind.allows(link.field) {
            return Err(OrchestratorError::validation(
                link.field.property(),
                format!("not applicable to {}", kind),
            ));
        }
    }
    Ok(ContainerScope {
        kind,
        mode_id,
        key: ScopeKey::Container(containment),
    })
}

/// Scope addressed by a reorder request
pub fn reorder_scope(
    kind: EntityKind,
    mode_id: Uuid,
    descriptor: &ScopeDescriptor,
) -> Result<ContainerScope> {
    let key = match *descriptor {
        ScopeDescriptor::Home { container } => {
            if let Some(link) = container {
                if !kind.allows(link.field) {
                    return Err(OrchestratorError::validation(
                        "container",
                        format!("{} cannot be ordered inside a {}", kind, link.field),
                    ));
                }
            }
            ScopeKey::Home(container)
        }
        ScopeDescriptor::Dated { date } => ScopeKey::Dated(date),
    };
    Ok(ContainerScope { kind, mode_id, key })
}

/// Position following `max`, or the first position of an empty scope
pub fn end_position(max: Option<i64>) -> i64 {
    max.unwrap_or(0) + POSITION_STEP
}

/// End-of-scope position for an entity with this kind, mode and containment
pub async fn assign_end_position(
    store: &dyn EntityStore,
    kind: EntityKind,
    mode_id: Option<Uuid>,
    containment: Option<ContainmentLink>,
) -> Result<i64> {
    let scope = compute_scope(kind, mode_id, containment)?;
    let max = store.max_position(&scope).await?;
    let position = end_position(max);
    debug!(kind = %kind, mode_id = %scope.mode_id, ?max, position, "Assigned end position");
    Ok(position)
}

/// True iff the mode or the containment link would change
pub fn container_changed(
    old: &EntityNode,
    mode_id: Option<Uuid>,
    containment: Option<ContainmentLink>,
) -> bool {
    old.mode_id != mode_id || old.containment != containment
}
