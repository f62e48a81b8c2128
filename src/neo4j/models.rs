//! Graph models for the Goal > Project > Milestone > Task hierarchy

use crate::error::OrchestratorError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Entity kinds
// ============================================================================

/// The four entity kinds, ordered by rank (Goal highest, Task leaf)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Goal,
    Project,
    Milestone,
    Task,
}

impl EntityKind {
    /// All kinds, highest rank first
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Goal,
        EntityKind::Project,
        EntityKind::Milestone,
        EntityKind::Task,
    ];

    /// Order in which batch removals walk a selection (leaves first)
    pub const LEAVES_FIRST: [EntityKind; 4] = [
        EntityKind::Task,
        EntityKind::Milestone,
        EntityKind::Project,
        EntityKind::Goal,
    ];

    /// Rank, 0 for Goal up to 3 for Task
    pub fn rank(self) -> u8 {
        match self {
            EntityKind::Goal => 0,
            EntityKind::Project => 1,
            EntityKind::Milestone => 2,
            EntityKind::Task => 3,
        }
    }

    /// Neo4j node label
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Goal => "Goal",
            EntityKind::Project => "Project",
            EntityKind::Milestone => "Milestone",
            EntityKind::Task => "Task",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Goal => "goal",
            EntityKind::Project => "project",
            EntityKind::Milestone => "milestone",
            EntityKind::Task => "task",
        }
    }

    /// Containment fields this kind may carry (at most one set at a time)
    pub fn containment_fields(self) -> &'static [ContainmentField] {
        match self {
            EntityKind::Goal => &[],
            EntityKind::Project => &[ContainmentField::Parent, ContainmentField::Goal],
            EntityKind::Milestone => &[
                ContainmentField::Parent,
                ContainmentField::Project,
                ContainmentField::Goal,
            ],
            EntityKind::Task => &[
                ContainmentField::Milestone,
                ContainmentField::Project,
                ContainmentField::Goal,
            ],
        }
    }

    pub fn allows(self, field: ContainmentField) -> bool {
        self.containment_fields().contains(&field)
    }

    /// Every (child kind, field) pair whose field points at an entity of this kind
    pub fn referrers(self) -> Vec<(EntityKind, ContainmentField)> {
        EntityKind::ALL
            .iter()
            .flat_map(|&child| {
                child
                    .containment_fields()
                    .iter()
                    .filter(move |field| field.target_kind(child) == self)
                    .map(move |&field| (child, field))
            })
            .collect()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "goal" => Ok(EntityKind::Goal),
            "project" => Ok(EntityKind::Project),
            "milestone" => Ok(EntityKind::Milestone),
            "task" => Ok(EntityKind::Task),
            other => Err(OrchestratorError::validation(
                "kind",
                format!("unknown entity kind '{}'", other),
            )),
        }
    }
}

// ============================================================================
// Containment
// ============================================================================

/// A nullable reference naming an entity's immediate container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentField {
    Goal,
    Project,
    Milestone,
    /// Same-kind parent (Project under Project, Milestone under Milestone)
    Parent,
}

impl ContainmentField {
    /// Property name on the node
    pub fn property(self) -> &'static str {
        match self {
            ContainmentField::Goal => "goal_id",
            ContainmentField::Project => "project_id",
            ContainmentField::Milestone => "milestone_id",
            ContainmentField::Parent => "parent_id",
        }
    }

    /// Kind of entity the field references when carried by `owner`
    pub fn target_kind(self, owner: EntityKind) -> EntityKind {
        match self {
            ContainmentField::Goal => EntityKind::Goal,
            ContainmentField::Project => EntityKind::Project,
            ContainmentField::Milestone => EntityKind::Milestone,
            ContainmentField::Parent => owner,
        }
    }

    /// Field a `child` uses to point at a container of kind `parent`, if any
    pub fn linking(child: EntityKind, parent: EntityKind) -> Option<ContainmentField> {
        child
            .containment_fields()
            .iter()
            .copied()
            .find(|field| field.target_kind(child) == parent)
    }
}

impl fmt::Display for ContainmentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property())
    }
}

/// The single set containment field of an entity and its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainmentLink {
    pub field: ContainmentField,
    pub id: Uuid,
}

impl ContainmentLink {
    pub fn new(field: ContainmentField, id: Uuid) -> Self {
        Self { field, id }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Whether an entity is live or retained only for history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Archived { archived_at: DateTime<Utc> },
}

impl Lifecycle {
    pub fn is_archived(&self) -> bool {
        matches!(self, Lifecycle::Archived { .. })
    }

    pub fn archived_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Archived { archived_at } => Some(*archived_at),
        }
    }
}

/// Explicit query view over the lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Active,
    Archived,
    All,
}

impl Visibility {
    pub fn admits(self, lifecycle: &Lifecycle) -> bool {
        match self {
            Visibility::Active => !lifecycle.is_archived(),
            Visibility::Archived => lifecycle.is_archived(),
            Visibility::All => true,
        }
    }
}

impl FromStr for Visibility {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Visibility::Active),
            "archived" => Ok(Visibility::Archived),
            "all" => Ok(Visibility::All),
            other => Err(OrchestratorError::validation(
                "visibility",
                format!("unknown visibility '{}'", other),
            )),
        }
    }
}

// ============================================================================
// Entity node
// ============================================================================

/// A Goal, Project, Milestone or Task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: Uuid,
    pub kind: EntityKind,
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    pub position: i64,
    pub lifecycle: Lifecycle,
    pub user_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub mode_id: Option<Uuid>,
    pub containment: Option<ContainmentLink>,
    pub created_at: DateTime<Utc>,
}

impl EntityNode {
    /// Create a new active, uncontained entity at position 0
    pub fn new(kind: EntityKind, title: String, user_id: Uuid, mode_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title,
            description: None,
            is_completed: false,
            due_date: None,
            due_time: None,
            position: 0,
            lifecycle: Lifecycle::Active,
            user_id,
            assigned_to: None,
            mode_id,
            containment: None,
            created_at: Utc::now(),
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id)
    }

    /// Value of one containment field (None when another field, or none, is set)
    pub fn containment_value(&self, field: ContainmentField) -> Option<Uuid> {
        self.containment
            .filter(|link| link.field == field)
            .map(|link| link.id)
    }

    pub fn is_archived(&self) -> bool {
        self.lifecycle.is_archived()
    }
}

/// Kind-tagged identity of an entity, as seen by collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// One write inside a `ChangeSet`. Timer and comment writes ride along with entity writes.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a new entity
    Insert(EntityNode),
    /// Overwrite every stored field of an existing entity
    Replace(EntityNode),
    /// Bulk-set mode, keeping containment
    SetMode {
        kind: EntityKind,
        ids: Vec<Uuid>,
        mode_id: Uuid,
    },
    /// Bulk-set mode and replace containment (None clears every field)
    Regroup {
        kind: EntityKind,
        ids: Vec<Uuid>,
        mode_id: Uuid,
        containment: Option<ContainmentLink>,
    },
    /// Bulk-set due date and/or time; `None` leaves a field untouched
    Schedule {
        kind: EntityKind,
        ids: Vec<Uuid>,
        due_date: Option<Option<NaiveDate>>,
        due_time: Option<Option<NaiveTime>>,
    },
    /// Direct position overwrite
    SetPositions {
        kind: EntityKind,
        positions: Vec<(Uuid, i64)>,
    },
    /// Soft-archive; also marks the entity completed
    Archive {
        kind: EntityKind,
        id: Uuid,
        archived_at: DateTime<Utc>,
    },
    /// Hard delete; children referencing it get that field nulled
    Delete { kind: EntityKind, id: Uuid },
    /// Close the user's running timer on `target` into a time entry, if one is running
    StopTimer {
        user_id: Uuid,
        target: EntityRef,
        stopped_at: DateTime<Utc>,
    },
    /// Soft-delete every live comment on `target`
    SoftDeleteComments {
        user_id: Uuid,
        target: EntityRef,
        deleted_at: DateTime<Utc>,
    },
}

impl Mutation {
    pub fn kind(&self) -> EntityKind {
        match self {
            Mutation::Insert(node) | Mutation::Replace(node) => node.kind,
            Mutation::SetMode { kind, .. }
            | Mutation::Regroup { kind, .. }
            | Mutation::Schedule { kind, .. }
            | Mutation::SetPositions { kind, .. }
            | Mutation::Archive { kind, .. }
            | Mutation::Delete { kind, .. } => *kind,
            Mutation::StopTimer { target, .. } | Mutation::SoftDeleteComments { target, .. } => {
                target.kind
            }
        }
    }
}

/// Ordered mutations applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    mutations: Vec<Mutation>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn extend(&mut self, mutations: impl IntoIterator<Item = Mutation>) {
        self.mutations.extend(mutations);
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }
}

impl From<Vec<Mutation>> for ChangeSet {
    fn from(mutations: Vec<Mutation>) -> Self {
        Self { mutations }
    }
}
