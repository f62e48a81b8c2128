//! Write-time invariants: containment exclusivity, mode/ancestor agreement,
//! acyclic same-kind parent chains.

use super::models::ContainmentInput;
use crate::error::{OrchestratorError, Result};
use crate::neo4j::models::{
    ContainmentField, ContainmentLink, EntityKind, EntityNode, Visibility,
};
use crate::neo4j::traits::EntityStore;
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

/// Collapse the raw fields into at most one link, rejecting fields the kind does not carry
pub fn at_most_one(kind: EntityKind, input: &ContainmentInput) -> Result<Option<ContainmentLink>> {
    let raw = [
        (ContainmentField::Goal, input.goal_id),
        (ContainmentField::Project, input.project_id),
        (ContainmentField::Milestone, input.milestone_id),
        (ContainmentField::Parent, input.parent_id),
    ];

    let mut set = Vec::new();
    for (field, value) in raw {
        let Some(id) = value else { continue };
        if !kind.allows(field) {
            return Err(OrchestratorError::validation(
                field.property(),
                format!("not applicable to {}", kind),
            ));
        }
        set.push(ContainmentLink::new(field, id));
    }

    match set.as_slice() {
        [] => Ok(None),
        [link] => Ok(Some(*link)),
        _ => {
            let names: Vec<&str> = kind
                .containment_fields()
                .iter()
                .map(|f| f.property())
                .collect();
            Err(OrchestratorError::validation(
                "containment",
                format!("{}: at most one of {} may be set.", kind, names.join(", ")),
            ))
        }
    }
}

/// Load the entity a link points at. Archived ancestors count; foreign ones do not exist.
pub async fn resolve_ancestor(
    store: &dyn EntityStore,
    user: Uuid,
    kind: EntityKind,
    link: ContainmentLink,
) -> Result<EntityNode> {
    let target = link.field.target_kind(kind);
    store
        .get_entity(target, link.id, Visibility::All)
        .await?
        .filter(|ancestor| ancestor.user_id == user)
        .ok_or_else(|| OrchestratorError::not_found(target, link.id))
}

/// The entity's mode must equal its container's mode
pub fn check_mode_matches(mode_id: Option<Uuid>, ancestor: &EntityNode) -> Result<()> {
    if ancestor.mode_id.is_some() && ancestor.mode_id == mode_id {
        return Ok(());
    }
    warn!(
        ancestor = %ancestor.entity_ref(),
        ?mode_id,
        ancestor_mode = ?ancestor.mode_id,
        "Rejected cross-mode containment"
    );
    Err(OrchestratorError::validation(
        "mode_id",
        format!("mode must match the containing {}'s mode", ancestor.kind),
    ))
}

/// IDs on the same-kind parent chain above `start`, `start` included
pub async fn ancestor_chain(store: &dyn EntityStore, start: &EntityNode) -> Result<HashSet<Uuid>> {
    let mut chain = HashSet::from([start.id]);
    let mut next = start.containment_value(ContainmentField::Parent);

    while let Some(id) = next {
        if !chain.insert(id) {
            break;
        }
        next = store
            .get_entity(start.kind, id, Visibility::All)
            .await?
            .and_then(|parent| parent.containment_value(ContainmentField::Parent));
    }
    Ok(chain)
}

/// Reject making `new_parent` the parent of any entity in `moving`
pub async fn check_no_cycle(
    store: &dyn EntityStore,
    moving: &[Uuid],
    new_parent: &EntityNode,
) -> Result<()> {
    let chain = ancestor_chain(store, new_parent).await?;
    if let Some(id) = moving.iter().find(|id| chain.contains(id)) {
        warn!(entity_id = %id, parent_id = %new_parent.id, "Rejected cyclic parent assignment");
        return Err(OrchestratorError::validation(
            "parent_id",
            format!("a {} cannot be placed under itself or its descendants", new_parent.kind),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neo4j::mock::MockEntityStore;
    use crate::test_helpers::*;

    #[test]
    fn test_at_most_one_accepts_single_field() {
        let project = Uuid::new_v4();
        let input = ContainmentInput {
            project_id: Some(project),
            ..Default::default()
        };
        let link = at_most_one(EntityKind::Task, &input).unwrap();
        assert_eq!(link, Some(ContainmentLink::new(ContainmentField::Project, project)));

        assert_eq!(at_most_one(EntityKind::Task, &ContainmentInput::default()).unwrap(), None);
    }

    #[test]
    fn test_at_most_one_rejects_two_fields() {
        let input = ContainmentInput {
            goal_id: Some(Uuid::new_v4()),
            parent_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        let err = at_most_one(EntityKind::Project, &input).unwrap_err();
        assert_eq!(
            err.to_string(),
            "containment: project: at most one of parent_id, goal_id may be set."
        );
    }

    #[test]
    fn test_at_most_one_rejects_inapplicable_field() {
        let input = ContainmentInput {
            milestone_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        let err = at_most_one(EntityKind::Project, &input).unwrap_err();
        assert!(
            matches!(err, OrchestratorError::Validation { ref field, .. } if field == "milestone_id")
        );

        let input = ContainmentInput {
            goal_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert!(at_most_one(EntityKind::Goal, &input).is_err());
    }

    #[test]
    fn test_check_mode_matches() {
        let user = Uuid::new_v4();
        let mode = Uuid::new_v4();
        let goal = test_goal(user, mode);
        assert!(check_mode_matches(Some(mode), &goal).is_ok());

        let err = check_mode_matches(Some(Uuid::new_v4()), &goal).unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation { ref field, .. } if field == "mode_id"));

        let mut modeless = test_goal(user, mode);
        modeless.mode_id = None;
        assert!(check_mode_matches(None, &modeless).is_err());
    }

    #[tokio::test]
    async fn test_resolve_ancestor_hides_foreign_entities() {
        let owner = Uuid::new_v4();
        let mode = Uuid::new_v4();
        let goal = test_goal(owner, mode);
        let link = ContainmentLink::new(ContainmentField::Goal, goal.id);
        let store = MockEntityStore::new().with_entity(goal.clone());

        let found = resolve_ancestor(&store, owner, EntityKind::Task, link)
            .await
            .unwrap();
        assert_eq!(found.id, goal.id);

        let err = resolve_ancestor(&store, Uuid::new_v4(), EntityKind::Task, link)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound { kind: EntityKind::Goal, .. }));
    }

    #[tokio::test]
    async fn test_resolve_ancestor_includes_archived() {
        let user = Uuid::new_v4();
        let mode = Uuid::new_v4();
        let project = archived(test_project(user, mode));
        let link = ContainmentLink::new(ContainmentField::Project, project.id);
        let store = MockEntityStore::new().with_entity(project.clone());

        let found = resolve_ancestor(&store, user, EntityKind::Milestone, link)
            .await
            .unwrap();
        assert!(found.is_archived());
    }

    #[tokio::test]
    async fn test_cycle_detection() {
        let user = Uuid::new_v4();
        let mode = Uuid::new_v4();
        let root = test_project(user, mode);
        let child = contained(test_project(user, mode), ContainmentField::Parent, root.id);
        let grandchild = contained(test_project(user, mode), ContainmentField::Parent, child.id);
        let unrelated = test_project(user, mode);

        let store = MockEntityStore::new()
            .with_entity(root.clone())
            .with_entity(child.clone())
            .with_entity(grandchild.clone())
            .with_entity(unrelated.clone());

        let chain = ancestor_chain(&store, &grandchild).await.unwrap();
        assert_eq!(chain, HashSet::from([grandchild.id, child.id, root.id]));

        // root under its own grandchild
        assert!(check_no_cycle(&store, &[root.id], &grandchild).await.is_err());
        // self-parenting
        assert!(check_no_cycle(&store, &[child.id], &child).await.is_err());
        // moving a leaf under an unrelated tree is fine
        assert!(check_no_cycle(&store, &[grandchild.id], &unrelated)
            .await
            .is_ok());
    }
}
