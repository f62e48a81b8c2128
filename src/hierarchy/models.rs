//! Request and response types for hierarchy operations

use crate::error::{OrchestratorError, Result};
use crate::neo4j::models::{ContainmentLink, EntityKind};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Distinguish an absent field (`None`) from an explicit null (`Some(None)`)
fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ============================================================================
// Containment input
// ============================================================================

/// The four raw containment fields as a caller sends them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainmentInput {
    #[serde(default)]
    pub goal_id: Option<Uuid>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub milestone_id: Option<Uuid>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

impl ContainmentInput {
    /// Spread a stored link back into the four fields
    pub fn from_link(link: Option<ContainmentLink>) -> Self {
        use crate::neo4j::models::ContainmentField as F;
        let mut input = Self::default();
        if let Some(link) = link {
            match link.field {
                F::Goal => input.goal_id = Some(link.id),
                F::Project => input.project_id = Some(link.id),
                F::Milestone => input.milestone_id = Some(link.id),
                F::Parent => input.parent_id = Some(link.id),
            }
        }
        input
    }
}

// ============================================================================
// Single-entity requests
// ============================================================================

/// Request to create an entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEntityRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Inherited from the containing entity when omitted
    #[serde(default)]
    pub mode_id: Option<Uuid>,
    #[serde(flatten)]
    pub containment: ContainmentInput,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_time: Option<NaiveTime>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    #[serde(default)]
    pub is_completed: bool,
}

/// Partial update. Absent fields are left alone; `null` clears a nullable field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEntityRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub is_completed: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_time: Option<Option<NaiveTime>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<Uuid>>,
    #[serde(default)]
    pub mode_id: Option<Uuid>,
    #[serde(default, deserialize_with = "double_option")]
    pub goal_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub project_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub milestone_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
}

impl UpdateEntityRequest {
    /// Stored containment overlaid with whatever this request sets or clears
    pub fn merge_containment(&self, stored: ContainmentInput) -> ContainmentInput {
        ContainmentInput {
            goal_id: self.goal_id.unwrap_or(stored.goal_id),
            project_id: self.project_id.unwrap_or(stored.project_id),
            milestone_id: self.milestone_id.unwrap_or(stored.milestone_id),
            parent_id: self.parent_id.unwrap_or(stored.parent_id),
        }
    }
}

/// How a removal ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Archived,
    Deleted,
}

/// Result of `remove_entity`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalOutcome {
    pub kind: EntityKind,
    pub id: Uuid,
    pub disposition: Disposition,
}

// ============================================================================
// Reordering
// ============================================================================

/// Which sibling group a reorder request addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ScopeDescriptor {
    /// Undated members of one containment group; no container means the mode's top level
    Home {
        #[serde(default)]
        container: Option<ContainmentLink>,
    },
    /// Members due on a date, whatever their containment
    Dated { date: NaiveDate },
}

/// One (id, position) pair of a reorder request or response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionChange {
    pub id: Uuid,
    pub position: i64,
}

/// Body of a reorder request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub mode_id: Uuid,
    #[serde(flatten)]
    pub scope: ScopeDescriptor,
    pub changes: Vec<PositionChange>,
}

// ============================================================================
// Batch operations
// ============================================================================

/// Mixed selection of entity ids, one list per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub goal: Vec<Uuid>,
    #[serde(default)]
    pub project: Vec<Uuid>,
    #[serde(default)]
    pub milestone: Vec<Uuid>,
    #[serde(default)]
    pub task: Vec<Uuid>,
}

impl Selection {
    pub fn ids(&self, kind: EntityKind) -> &[Uuid] {
        match kind {
            EntityKind::Goal => &self.goal,
            EntityKind::Project => &self.project,
            EntityKind::Milestone => &self.milestone,
            EntityKind::Task => &self.task,
        }
    }

    pub fn is_empty(&self) -> bool {
        EntityKind::ALL.iter().all(|&kind| self.ids(kind).is_empty())
    }

    /// Reject a selection with no ids at all
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(OrchestratorError::validation("selected", "No ids provided."));
        }
        Ok(())
    }
}

/// Due date/time to apply in a batch schedule. Absent fields are not touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePayload {
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_time: Option<Option<NaiveTime>>,
}

impl SchedulePayload {
    pub fn is_empty(&self) -> bool {
        self.due_date.is_none() && self.due_time.is_none()
    }
}

/// Body of a batch schedule request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub selected: Selection,
    #[serde(flatten)]
    pub payload: SchedulePayload,
}

/// Entities affected by a batch operation, per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub goal: usize,
    pub project: usize,
    pub milestone: usize,
    pub task: usize,
}

impl BatchCounts {
    pub fn get(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Goal => self.goal,
            EntityKind::Project => self.project,
            EntityKind::Milestone => self.milestone,
            EntityKind::Task => self.task,
        }
    }

    pub fn add(&mut self, kind: EntityKind, n: usize) {
        match kind {
            EntityKind::Goal => self.goal += n,
            EntityKind::Project => self.project += n,
            EntityKind::Milestone => self.milestone += n,
            EntityKind::Task => self.task += n,
        }
    }

    pub fn total(&self) -> usize {
        self.goal + self.project + self.milestone + self.task
    }
}
