//! Mode cascade propagator
//!
//! When an entity's mode changes, every entity reachable below it through the
//! containment fields moves to the same mode. Containment itself is untouched.
//! The walk is rank by rank: each lower kind is seeded from the closed sets of
//! the kinds above it, then closed over its own `parent_id` chain with a
//! frontier loop until no new ids appear. Archived entities are included.

use crate::error::Result;
use crate::neo4j::models::{ContainmentField, EntityKind, EntityRef, Mutation};
use crate::neo4j::traits::EntityStore;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

/// Entities below a cascade root, per kind. The root itself is not included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descendants {
    pub projects: BTreeSet<Uuid>,
    pub milestones: BTreeSet<Uuid>,
    pub tasks: BTreeSet<Uuid>,
}

impl Descendants {
    pub fn len(&self) -> usize {
        self.projects.len() + self.milestones.len() + self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&mut self, kind: EntityKind) -> Option<&mut BTreeSet<Uuid>> {
        match kind {
            EntityKind::Goal => None,
            EntityKind::Project => Some(&mut self.projects),
            EntityKind::Milestone => Some(&mut self.milestones),
            EntityKind::Task => Some(&mut self.tasks),
        }
    }
}

/// Walk the containment graph below `root`
pub async fn collect_descendants(store: &dyn EntityStore, root: EntityRef) -> Result<Descendants> {
    let mut closed: BTreeMap<EntityKind, BTreeSet<Uuid>> = BTreeMap::new();
    closed.insert(root.kind, BTreeSet::from([root.id]));

    for kind in [EntityKind::Project, EntityKind::Milestone, EntityKind::Task] {
        if kind.rank() < root.kind.rank() {
            continue;
        }
        let mut members = closed.remove(&kind).unwrap_or_default();

        for &field in kind.containment_fields() {
            if field == ContainmentField::Parent {
                continue;
            }
            let Some(parents) = closed.get(&field.target_kind(kind)) else {
                continue;
            };
            if parents.is_empty() {
                continue;
            }
            let parents: Vec<Uuid> = parents.iter().copied().collect();
            members.extend(store.child_ids(kind, field, &parents).await?);
        }

        if kind.allows(ContainmentField::Parent) {
            close_over_parents(store, kind, &mut members).await?;
        }
        closed.insert(kind, members);
    }

    let mut descendants = Descendants::default();
    for (kind, mut ids) in closed {
        if kind == root.kind {
            ids.remove(&root.id);
        }
        if let Some(slot) = descendants.slot(kind) {
            *slot = ids;
        }
    }
    Ok(descendants)
}

/// Expand `members` with every same-kind entity hanging below them via `parent_id`
async fn close_over_parents(
    store: &dyn EntityStore,
    kind: EntityKind,
    members: &mut BTreeSet<Uuid>,
) -> Result<()> {
    let mut frontier: Vec<Uuid> = members.iter().copied().collect();
    while !frontier.is_empty() {
        let children = store
            .child_ids(kind, ContainmentField::Parent, &frontier)
            .await?;
        frontier = children
            .into_iter()
            .filter(|id| members.insert(*id))
            .collect();
    }
    Ok(())
}

/// One bulk mode update per non-empty kind, Projects then Milestones then Tasks
pub fn cascade_mutations(descendants: &Descendants, mode_id: Uuid) -> Vec<Mutation> {
    [
        (EntityKind::Project, &descendants.projects),
        (EntityKind::Milestone, &descendants.milestones),
        (EntityKind::Task, &descendants.tasks),
    ]
    .into_iter()
    .filter(|(_, ids)| !ids.is_empty())
    .map(|(kind, ids)| Mutation::SetMode {
        kind,
        ids: ids.iter().copied().collect(),
        mode_id,
    })
    .collect()
}

/// Mutations moving everything below `root` into `mode_id`. Empty for tasks.
pub async fn cascade_mode(
    store: &dyn EntityStore,
    root: EntityRef,
    mode_id: Uuid,
) -> Result<Vec<Mutation>> {
    if root.kind == EntityKind::Task {
        return Ok(Vec::new());
    }
    let descendants = collect_descendants(store, root).await?;
    debug!(
        root = %root,
        projects = descendants.projects.len(),
        milestones = descendants.milestones.len(),
        tasks = descendants.tasks.len(),
        "Mode cascade closure computed"
    );
    Ok(cascade_mutations(&descendants, mode_id))
}
