//! Neo4j client for the entity hierarchy and its collaborators

use super::models::*;
use crate::hierarchy::ordering::{ContainerScope, ScopeKey};
use anyhow::{Context, Result};
use chrono::Utc;
use neo4rs::{query, BoltType, Graph, Query};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Client for Neo4j operations
pub struct Neo4jClient {
    graph: Arc<Graph>,
}

/// Builder for dynamic WHERE clauses in Cypher queries
#[derive(Default)]
pub struct WhereBuilder {
    conditions: Vec<String>,
}

impl WhereBuilder {
    /// Create a new empty WhereBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one lifecycle view
    pub fn add_visibility_filter(&mut self, alias: &str, visibility: Visibility) -> &mut Self {
        match visibility {
            Visibility::Active => self
                .conditions
                .push(format!("COALESCE({}.is_archived, false) = false", alias)),
            Visibility::Archived => self
                .conditions
                .push(format!("COALESCE({}.is_archived, false) = true", alias)),
            Visibility::All => {}
        }
        self
    }

    /// Add an owner filter
    pub fn add_owner_filter(&mut self, alias: &str, owner: Option<Uuid>) -> &mut Self {
        if let Some(owner) = owner {
            self.conditions
                .push(format!("{}.user_id = '{}'", alias, owner));
        }
        self
    }

    /// Exactly this containment link, every other field of the kind unset
    pub fn add_containment_filter(
        &mut self,
        alias: &str,
        kind: EntityKind,
        link: Option<ContainmentLink>,
    ) -> &mut Self {
        for &field in kind.containment_fields() {
            match link {
                Some(link) if link.field == field => self.conditions.push(format!(
                    "{}.{} = '{}'",
                    alias,
                    field.property(),
                    link.id
                )),
                _ => self
                    .conditions
                    .push(format!("{}.{} IS NULL", alias, field.property())),
            }
        }
        self
    }

    /// Members of a sibling scope
    pub fn add_scope_filter(&mut self, alias: &str, scope: &ContainerScope) -> &mut Self {
        self.conditions
            .push(format!("{}.mode_id = '{}'", alias, scope.mode_id));
        self.add_visibility_filter(alias, Visibility::Active);
        if scope.open_only() {
            self.conditions
                .push(format!("COALESCE({}.is_completed, false) = false", alias));
        }
        match scope.key {
            ScopeKey::Container(link) => {
                self.add_containment_filter(alias, scope.kind, link);
            }
            ScopeKey::Home(link) => {
                self.add_containment_filter(alias, scope.kind, link);
                self.conditions.push(format!("{}.due_date IS NULL", alias));
            }
            ScopeKey::Dated(date) => self.conditions.push(format!(
                "{}.due_date = '{}'",
                alias,
                date.format("%Y-%m-%d")
            )),
        }
        self
    }

    /// Build the WHERE clause (returns empty string if no conditions)
    pub fn build(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// Build an AND clause to append to existing WHERE (returns empty string if no conditions)
    pub fn build_and(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("AND {}", self.conditions.join(" AND "))
        }
    }
}

/// Builder for SET clauses. `None` values are written as `null`, which removes the property.
#[derive(Default)]
struct SetBuilder {
    clauses: Vec<String>,
    params: Vec<(String, BoltType)>,
}

impl SetBuilder {
    fn set(&mut self, alias: &str, prop: &str, value: impl Into<BoltType>) -> &mut Self {
        self.clauses.push(format!("{0}.{1} = $set_{1}", alias, prop));
        self.params.push((format!("set_{}", prop), value.into()));
        self
    }

    fn set_opt<T: Into<BoltType>>(&mut self, alias: &str, prop: &str, value: Option<T>) -> &mut Self {
        match value {
            Some(value) => self.set(alias, prop, value),
            None => {
                self.clauses.push(format!("{}.{} = null", alias, prop));
                self
            }
        }
    }

    /// Write every containment field of the kind, keeping only `link`
    fn set_containment(
        &mut self,
        alias: &str,
        kind: EntityKind,
        link: Option<ContainmentLink>,
    ) -> &mut Self {
        for &field in kind.containment_fields() {
            let value = link.filter(|l| l.field == field).map(|l| l.id.to_string());
            self.set_opt(alias, field.property(), value);
        }
        self
    }

    fn build(&self) -> String {
        format!("SET {}", self.clauses.join(", "))
    }

    fn bind(self, mut q: Query) -> Query {
        for (key, value) in self.params {
            q = q.param(&key, value);
        }
        q
    }
}

/// Every mutable property of an entity
fn entity_assignments(entity: &EntityNode) -> SetBuilder {
    let mut set = SetBuilder::default();
    set.set("n", "title", entity.title.clone())
        .set_opt("n", "description", entity.description.clone())
        .set("n", "is_completed", entity.is_completed)
        .set_opt(
            "n",
            "due_date",
            entity.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
        )
        .set_opt(
            "n",
            "due_time",
            entity.due_time.map(|t| t.format("%H:%M:%S").to_string()),
        )
        .set("n", "position", entity.position)
        .set("n", "is_archived", entity.is_archived())
        .set_opt(
            "n",
            "archived_at",
            entity.lifecycle.archived_at().map(|at| at.to_rfc3339()),
        )
        .set_opt("n", "assigned_to", entity.assigned_to.map(|u| u.to_string()))
        .set_opt("n", "mode_id", entity.mode_id.map(|u| u.to_string()))
        .set_containment("n", entity.kind, entity.containment);
    set
}

fn id_list(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Translate one mutation into the Cypher statements that perform it
fn mutation_queries(mutation: &Mutation) -> Vec<Query> {
    match mutation {
        Mutation::Insert(entity) => {
            let set = entity_assignments(entity);
            let cypher = format!(
                "CREATE (n:{} {{id: $id, user_id: $user_id, created_at: $created_at}}) {}",
                entity.kind.label(),
                set.build()
            );
            vec![set.bind(
                query(&cypher)
                    .param("id", entity.id.to_string())
                    .param("user_id", entity.user_id.to_string())
                    .param("created_at", entity.created_at.to_rfc3339()),
            )]
        }
        Mutation::Replace(entity) => {
            let set = entity_assignments(entity);
            let cypher = format!(
                "MATCH (n:{} {{id: $id}}) {}",
                entity.kind.label(),
                set.build()
            );
            vec![set.bind(query(&cypher).param("id", entity.id.to_string()))]
        }
        Mutation::SetMode { kind, ids, mode_id } => {
            let cypher = format!(
                "MATCH (n:{}) WHERE n.id IN $ids SET n.mode_id = $mode_id",
                kind.label()
            );
            vec![query(&cypher)
                .param("ids", id_list(ids))
                .param("mode_id", mode_id.to_string())]
        }
        Mutation::Regroup {
            kind,
            ids,
            mode_id,
            containment,
        } => {
            let mut set = SetBuilder::default();
            set.set("n", "mode_id", mode_id.to_string())
                .set_containment("n", *kind, *containment);
            let cypher = format!(
                "MATCH (n:{}) WHERE n.id IN $ids {}",
                kind.label(),
                set.build()
            );
            vec![set.bind(query(&cypher).param("ids", id_list(ids)))]
        }
        Mutation::Schedule {
            kind,
            ids,
            due_date,
            due_time,
        } => {
            let mut set = SetBuilder::default();
            if let Some(date) = due_date {
                set.set_opt("n", "due_date", date.map(|d| d.format("%Y-%m-%d").to_string()));
            }
            if let Some(time) = due_time {
                set.set_opt("n", "due_time", time.map(|t| t.format("%H:%M:%S").to_string()));
            }
            if set.clauses.is_empty() {
                return Vec::new();
            }
            let cypher = format!(
                "MATCH (n:{}) WHERE n.id IN $ids {}",
                kind.label(),
                set.build()
            );
            vec![set.bind(query(&cypher).param("ids", id_list(ids)))]
        }
        Mutation::SetPositions { kind, positions } => positions
            .iter()
            .map(|(id, position)| {
                query(&format!(
                    "MATCH (n:{} {{id: $id}}) SET n.position = $position",
                    kind.label()
                ))
                .param("id", id.to_string())
                .param("position", *position)
            })
            .collect(),
        Mutation::Archive {
            kind,
            id,
            archived_at,
        } => vec![query(&format!(
            r#"
            MATCH (n:{} {{id: $id}})
            SET n.is_archived = true, n.archived_at = $archived_at, n.is_completed = true
            "#,
            kind.label()
        ))
        .param("id", id.to_string())
        .param("archived_at", archived_at.to_rfc3339())],
        Mutation::Delete { kind, id } => {
            let mut queries: Vec<Query> = kind
                .referrers()
                .into_iter()
                .map(|(child, field)| {
                    query(&format!(
                        "MATCH (c:{} {{{}: $id}}) REMOVE c.{}",
                        child.label(),
                        field.property(),
                        field.property()
                    ))
                    .param("id", id.to_string())
                })
                .collect();
            queries.push(
                query(&format!("MATCH (n:{} {{id: $id}}) DETACH DELETE n", kind.label()))
                    .param("id", id.to_string()),
            );
            queries
        }
        // Match, delete and record in one statement: deleting the timer
        // write-locks it, so a concurrent closer fails instead of writing a
        // second entry. Timers on other targets never match.
        Mutation::StopTimer {
            user_id,
            target,
            stopped_at,
        } => vec![query(
            r#"
            MATCH (t:ActiveTimer {user_id: $user_id, target_kind: $target_kind, target_id: $target_id})
            WITH t, t.started_at AS started_at,
                 duration.inSeconds(datetime(t.started_at), datetime($ended_at)).seconds AS seconds
            DELETE t
            CREATE (e:TimeEntry {
                id: $entry_id,
                user_id: $user_id,
                target_kind: $target_kind,
                target_id: $target_id,
                started_at: started_at,
                ended_at: $ended_at,
                duration_seconds: CASE WHEN seconds < 1 THEN 1 ELSE seconds END
            })
            "#,
        )
        .param("user_id", user_id.to_string())
        .param("target_kind", target.kind.as_str())
        .param("target_id", target.id.to_string())
        .param("entry_id", Uuid::new_v4().to_string())
        .param("ended_at", stopped_at.to_rfc3339())],
        Mutation::SoftDeleteComments {
            user_id,
            target,
            deleted_at,
        } => vec![query(
            r#"
            MATCH (c:Comment {target_kind: $target_kind, target_id: $target_id})
            WHERE c.deleted_at IS NULL
            SET c.deleted_at = $deleted_at, c.deleted_by = $user_id
            "#,
        )
        .param("target_kind", target.kind.as_str())
        .param("target_id", target.id.to_string())
        .param("deleted_at", deleted_at.to_rfc3339())
        .param("user_id", user_id.to_string())],
    }
}

impl Neo4jClient {
    /// Create a new Neo4j client
    pub async fn new(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("Failed to connect to Neo4j")?;

        let client = Self {
            graph: Arc::new(graph),
        };

        // Initialize schema
        client.init_schema().await?;

        Ok(client)
    }

    /// Initialize the graph schema with constraints and indexes
    async fn init_schema(&self) -> Result<()> {
        let constraints = vec![
            "CREATE CONSTRAINT goal_id IF NOT EXISTS FOR (g:Goal) REQUIRE g.id IS UNIQUE",
            "CREATE CONSTRAINT project_id IF NOT EXISTS FOR (p:Project) REQUIRE p.id IS UNIQUE",
            "CREATE CONSTRAINT milestone_id IF NOT EXISTS FOR (m:Milestone) REQUIRE m.id IS UNIQUE",
            "CREATE CONSTRAINT task_id IF NOT EXISTS FOR (t:Task) REQUIRE t.id IS UNIQUE",
            "CREATE CONSTRAINT time_entry_id IF NOT EXISTS FOR (e:TimeEntry) REQUIRE e.id IS UNIQUE",
            "CREATE CONSTRAINT active_timer_user IF NOT EXISTS FOR (t:ActiveTimer) REQUIRE t.user_id IS UNIQUE",
        ];

        let indexes = vec![
            "CREATE INDEX goal_mode IF NOT EXISTS FOR (g:Goal) ON (g.mode_id)",
            "CREATE INDEX project_mode IF NOT EXISTS FOR (p:Project) ON (p.mode_id)",
            "CREATE INDEX milestone_mode IF NOT EXISTS FOR (m:Milestone) ON (m.mode_id)",
            "CREATE INDEX task_mode IF NOT EXISTS FOR (t:Task) ON (t.mode_id)",
            "CREATE INDEX goal_user IF NOT EXISTS FOR (g:Goal) ON (g.user_id)",
            "CREATE INDEX project_user IF NOT EXISTS FOR (p:Project) ON (p.user_id)",
            "CREATE INDEX milestone_user IF NOT EXISTS FOR (m:Milestone) ON (m.user_id)",
            "CREATE INDEX task_user IF NOT EXISTS FOR (t:Task) ON (t.user_id)",
            "CREATE INDEX task_due_date IF NOT EXISTS FOR (t:Task) ON (t.due_date)",
            "CREATE INDEX time_entry_target IF NOT EXISTS FOR (e:TimeEntry) ON (e.target_id)",
            "CREATE INDEX comment_target IF NOT EXISTS FOR (c:Comment) ON (c.target_id)",
        ];

        for constraint in constraints {
            if let Err(e) = self.graph.run(query(constraint)).await {
                tracing::warn!("Constraint may already exist: {}", e);
            }
        }

        for index in indexes {
            if let Err(e) = self.graph.run(query(index)).await {
                tracing::warn!("Index may already exist: {}", e);
            }
        }

        Ok(())
    }

    // ========================================================================
    // Entity reads
    // ========================================================================

    async fn collect_entities(&self, kind: EntityKind, q: Query) -> Result<Vec<EntityNode>> {
        let mut result = self.graph.execute(q).await?;
        let mut entities = Vec::new();
        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("n")?;
            entities.push(self.node_to_entity(kind, &node)?);
        }
        Ok(entities)
    }

    /// Get an entity by ID in one lifecycle view
    pub async fn get_entity(
        &self,
        kind: EntityKind,
        id: Uuid,
        visibility: Visibility,
    ) -> Result<Option<EntityNode>> {
        let mut wb = WhereBuilder::new();
        wb.add_visibility_filter("n", visibility);
        let cypher = format!(
            "MATCH (n:{} {{id: $id}}) {} RETURN n",
            kind.label(),
            wb.build()
        );
        let q = query(&cypher).param("id", id.to_string());
        Ok(self.collect_entities(kind, q).await?.into_iter().next())
    }

    /// Get the entities among `ids` owned by `owner`
    pub async fn get_owned(
        &self,
        kind: EntityKind,
        ids: &[Uuid],
        owner: Uuid,
        visibility: Visibility,
    ) -> Result<Vec<EntityNode>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut wb = WhereBuilder::new();
        wb.add_owner_filter("n", Some(owner))
            .add_visibility_filter("n", visibility);
        let cypher = format!(
            "MATCH (n:{}) WHERE n.id IN $ids {} RETURN n",
            kind.label(),
            wb.build_and()
        );
        let q = query(&cypher).param("ids", id_list(ids));
        self.collect_entities(kind, q).await
    }

    /// Highest position in a scope
    pub async fn max_position(&self, scope: &ContainerScope) -> Result<Option<i64>> {
        let mut wb = WhereBuilder::new();
        wb.add_scope_filter("n", scope);
        let cypher = format!(
            "MATCH (n:{}) {} RETURN max(n.position) AS max_position",
            scope.kind.label(),
            wb.build()
        );
        let mut result = self.graph.execute(query(&cypher)).await?;
        if let Some(row) = result.next().await? {
            Ok(row.get::<i64>("max_position").ok())
        } else {
            Ok(None)
        }
    }

    /// Members of a scope ordered by (position, id)
    pub async fn list_scope(
        &self,
        scope: &ContainerScope,
        owner: Option<Uuid>,
    ) -> Result<Vec<EntityNode>> {
        let mut wb = WhereBuilder::new();
        wb.add_scope_filter("n", scope).add_owner_filter("n", owner);
        let cypher = format!(
            "MATCH (n:{}) {} RETURN n ORDER BY n.position, n.id",
            scope.kind.label(),
            wb.build()
        );
        self.collect_entities(scope.kind, query(&cypher)).await
    }

    /// IDs of `kind` entities whose `field` points at one of `parent_ids`, archived included
    pub async fn child_ids(
        &self,
        kind: EntityKind,
        field: ContainmentField,
        parent_ids: &[Uuid],
    ) -> Result<Vec<Uuid>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let cypher = format!(
            "MATCH (n:{}) WHERE n.{} IN $parent_ids RETURN n.id AS id",
            kind.label(),
            field.property()
        );
        let q = query(&cypher).param("parent_ids", id_list(parent_ids));

        let mut result = self.graph.execute(q).await?;
        let mut ids = Vec::new();
        while let Some(row) = result.next().await? {
            ids.push(row.get::<String>("id")?.parse()?);
        }
        Ok(ids)
    }

    /// Helper to convert a Neo4j node to an EntityNode
    fn node_to_entity(&self, kind: EntityKind, node: &neo4rs::Node) -> Result<EntityNode> {
        let containment = kind.containment_fields().iter().find_map(|&field| {
            node.get::<String>(field.property())
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|id| ContainmentLink::new(field, id))
        });
        let lifecycle = if node.get::<bool>("is_archived").unwrap_or(false) {
            Lifecycle::Archived {
                archived_at: node
                    .get::<String>("archived_at")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(Utc::now),
            }
        } else {
            Lifecycle::Active
        };

        Ok(EntityNode {
            id: node.get::<String>("id")?.parse()?,
            kind,
            title: node.get("title")?,
            description: node.get("description").ok(),
            is_completed: node.get("is_completed").unwrap_or(false),
            due_date: node
                .get::<String>("due_date")
                .ok()
                .and_then(|s| s.parse().ok()),
            due_time: node
                .get::<String>("due_time")
                .ok()
                .and_then(|s| s.parse().ok()),
            position: node.get("position").unwrap_or(0),
            lifecycle,
            user_id: node.get::<String>("user_id")?.parse()?,
            assigned_to: node
                .get::<String>("assigned_to")
                .ok()
                .and_then(|s| s.parse().ok()),
            mode_id: node
                .get::<String>("mode_id")
                .ok()
                .and_then(|s| s.parse().ok()),
            containment,
            created_at: node
                .get::<String>("created_at")?
                .parse()
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    // ========================================================================
    // Entity writes
    // ========================================================================

    /// Run every mutation in one transaction, rolling back on the first failure
    pub async fn apply_changes(&self, changes: &ChangeSet) -> Result<()> {
        let queries: Vec<Query> = changes.iter().flat_map(mutation_queries).collect();
        if queries.is_empty() {
            return Ok(());
        }

        let mut txn = self
            .graph
            .start_txn()
            .await
            .context("Failed to start transaction")?;
        for q in queries {
            if let Err(e) = txn.run(q).await {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!("Rollback failed: {}", rollback);
                }
                return Err(e).context("Mutation failed, transaction rolled back");
            }
        }
        txn.commit().await.context("Failed to commit transaction")?;

        tracing::debug!(mutations = changes.len(), "Change set committed");
        Ok(())
    }

    // ========================================================================
    // Time tracking
    // ========================================================================

    /// Whether the user's running timer targets `target`
    pub async fn timer_running_on(&self, user: Uuid, target: EntityRef) -> Result<bool> {
        let q = query(
            r#"
            MATCH (t:ActiveTimer {user_id: $user_id, target_kind: $target_kind, target_id: $target_id})
            RETURN count(t) AS running
            "#,
        )
        .param("user_id", user.to_string())
        .param("target_kind", target.kind.as_str())
        .param("target_id", target.id.to_string());

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            Ok(row.get::<i64>("running")? > 0)
        } else {
            Ok(false)
        }
    }

    /// Whether any time entry references `target` directly
    pub async fn has_time_entries(&self, target: EntityRef) -> Result<bool> {
        let q = query(
            r#"
            MATCH (e:TimeEntry {target_kind: $target_kind, target_id: $target_id})
            RETURN count(e) AS entries
            "#,
        )
        .param("target_kind", target.kind.as_str())
        .param("target_id", target.id.to_string());

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            Ok(row.get::<i64>("entries")? > 0)
        } else {
            Ok(false)
        }
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Modes the user owns or edits as a collaborator
    pub async fn mode_ids_writable_by(&self, user: Uuid) -> Result<HashSet<Uuid>> {
        let q = query(
            r#"
            MATCH (m:Mode {user_id: $user_id})
            RETURN m.id AS id
            UNION
            MATCH (c:ModeCollaborator {user_id: $user_id, role: 'editor'})
            RETURN c.mode_id AS id
            "#,
        )
        .param("user_id", user.to_string());

        let mut result = self.graph.execute(q).await?;
        let mut modes = HashSet::new();
        while let Some(row) = result.next().await? {
            modes.insert(row.get::<String>("id")?.parse()?);
        }
        Ok(modes)
    }
}
