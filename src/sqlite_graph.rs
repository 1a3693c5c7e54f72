//! SQLite-backed [`GraphStore`].
//!
//! Nodes live in `graph_nodes` with their typed attributes serialized as
//! JSON; relationships live in `graph_relationships` with the type stored
//! in its `domain:NAME` form. Attribute lookups use `json_extract`.
//!
//! Traversal is a recursive CTE over `(id, depth, path)` rows, where
//! `path` lists the relationship ids walked so far and no relationship
//! appears twice. Each hop follows a derived `edges` relation that
//! contains a forward row for every relationship the direction allows and
//! a reversed row where the traversal may walk against the stored
//! direction. Undirected types (`SIMILAR_TO`) always contribute both rows.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use ragweave_core::graph::{Direction, GraphStore, Node, NodeKind, RelationType, Relationship, Traversal};
use ragweave_core::models::Metadata;
use ragweave_core::{Error, Result};

use crate::sqlite_store::{db_err, from_micros, parse_metadata, to_micros};

#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn require_node(&self, id: &str) -> Result<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM graph_nodes WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        if count > 0 {
            Ok(())
        } else {
            Err(Error::NotFound(format!("node {id}")))
        }
    }

    async fn insert_relationship(
        &self,
        rel_type: RelationType,
        from_id: &str,
        to_id: &str,
        properties: Metadata,
    ) -> Result<Relationship> {
        let rel = Relationship {
            id: Uuid::new_v4().to_string(),
            rel_type,
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            properties,
            created_at: from_micros(to_micros(Utc::now())),
        };
        sqlx::query(
            r#"
            INSERT INTO graph_relationships (id, rel_type, from_id, to_id, properties, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rel.id)
        .bind(rel.rel_type.to_string())
        .bind(&rel.from_id)
        .bind(&rel.to_id)
        .bind(serde_json::to_string(&rel.properties)?)
        .bind(to_micros(rel.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rel)
    }
}

#[derive(sqlx::FromRow)]
struct NodeRow {
    id: String,
    label: String,
    attributes: String,
    additional_attributes: String,
    created_at: i64,
    updated_at: Option<i64>,
}

impl TryFrom<NodeRow> for Node {
    type Error = Error;

    fn try_from(row: NodeRow) -> Result<Self> {
        let attributes: serde_json::Value = serde_json::from_str(&row.attributes)?;
        Ok(Node {
            id: row.id,
            kind: NodeKind::from_parts(&row.label, attributes)?,
            additional_attributes: parse_metadata(&row.additional_attributes)?,
            created_at: Some(from_micros(row.created_at)),
            updated_at: row.updated_at.map(from_micros),
        })
    }
}

#[derive(sqlx::FromRow)]
struct RelationshipRow {
    id: String,
    rel_type: String,
    from_id: String,
    to_id: String,
    properties: String,
    created_at: i64,
}

impl TryFrom<RelationshipRow> for Relationship {
    type Error = Error;

    fn try_from(row: RelationshipRow) -> Result<Self> {
        Ok(Relationship {
            id: row.id,
            rel_type: row.rel_type.parse()?,
            from_id: row.from_id,
            to_id: row.to_id,
            properties: parse_metadata(&row.properties)?,
            created_at: from_micros(row.created_at),
        })
    }
}

fn nodes<R>(rows: Vec<R>) -> Result<Vec<Node>>
where
    Node: TryFrom<R, Error = Error>,
{
    rows.into_iter().map(Node::try_from).collect()
}

fn relationships(rows: Vec<RelationshipRow>) -> Result<Vec<Relationship>> {
    rows.into_iter().map(Relationship::try_from).collect()
}

const NODE_COLUMNS: &str = "id, label, attributes, additional_attributes, created_at, updated_at";
const REL_COLUMNS: &str = "id, rel_type, from_id, to_id, properties, created_at";

/// JSON path of a top-level attribute, quoted so any key is addressable.
fn attribute_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Relationship types walked along and against their stored direction.
fn hop_types(traversal: &Traversal) -> (Vec<String>, Vec<String>) {
    let mut forward = Vec::new();
    let mut backward = Vec::new();
    for rel_type in &traversal.rel_types {
        let direction = if rel_type.is_undirected() {
            Direction::Both
        } else {
            traversal.direction
        };
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            forward.push(rel_type.to_string());
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            backward.push(rel_type.to_string());
        }
    }
    (forward, backward)
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn create_node(&self, mut node: Node) -> Result<Node> {
        let created_at = node.created_at.unwrap_or_else(Utc::now);
        node.created_at = Some(from_micros(to_micros(created_at)));
        let (label, attributes) = node.kind.to_parts()?;

        sqlx::query(
            r#"
            INSERT INTO graph_nodes (id, label, attributes, additional_attributes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node.id)
        .bind(label)
        .bind(serde_json::to_string(&attributes)?)
        .bind(serde_json::to_string(&node.additional_attributes)?)
        .bind(to_micros(created_at))
        .bind(node.updated_at.map(to_micros))
        .execute(&self.pool)
        .await
        .map_err(|e| match db_err(e) {
            Error::Conflict(_) => Error::Conflict(format!("node {} already exists", node.id)),
            other => other,
        })?;

        Ok(node)
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let row: Option<NodeRow> =
            sqlx::query_as(&format!("SELECT {NODE_COLUMNS} FROM graph_nodes WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(Node::try_from).transpose()
    }

    async fn update_node(&self, mut node: Node) -> Result<Node> {
        let existing = self
            .get_node(&node.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("node {}", node.id)))?;
        if existing.label() != node.label() {
            return Err(Error::InvalidInput(format!(
                "node {} is a {}, cannot become a {}",
                node.id,
                existing.label(),
                node.label()
            )));
        }

        let updated_at = from_micros(to_micros(Utc::now()));
        let (_, attributes) = node.kind.to_parts()?;
        sqlx::query(
            "UPDATE graph_nodes SET attributes = ?, additional_attributes = ?, updated_at = ? WHERE id = ?",
        )
        .bind(serde_json::to_string(&attributes)?)
        .bind(serde_json::to_string(&node.additional_attributes)?)
        .bind(to_micros(updated_at))
        .bind(&node.id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        node.created_at = existing.created_at;
        node.updated_at = Some(updated_at);
        Ok(node)
    }

    async fn delete_node(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM graph_relationships WHERE from_id = ? OR to_id = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let result = sqlx::query("DELETE FROM graph_nodes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("node {id}")));
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list_nodes(&self, label: &str, offset: i64, limit: i64) -> Result<Vec<Node>> {
        let rows: Vec<NodeRow> = sqlx::query_as(&format!(
            "SELECT {NODE_COLUMNS} FROM graph_nodes WHERE label = ? \
             ORDER BY created_at DESC, id LIMIT ? OFFSET ?"
        ))
        .bind(label)
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        nodes(rows)
    }

    async fn find_nodes(&self, label: &str, key: &str, value: &serde_json::Value) -> Result<Vec<Node>> {
        let rows: Vec<NodeRow> = sqlx::query_as(&format!(
            "SELECT {NODE_COLUMNS} FROM graph_nodes \
             WHERE label = ? AND json_extract(attributes, ?) = json_extract(?, '$') \
             ORDER BY id"
        ))
        .bind(label)
        .bind(attribute_path(key))
        .bind(serde_json::to_string(value)?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        nodes(rows)
    }

    async fn search_nodes(&self, label: &str, keys: &[&str], fragment: &str, limit: i64) -> Result<Vec<Node>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let clauses = vec![
            "(json_type(attributes, ?) = 'text' AND instr(lower(json_extract(attributes, ?)), lower(?)) > 0)";
            keys.len()
        ]
        .join(" OR ");
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM graph_nodes WHERE label = ? AND ({clauses}) \
             ORDER BY created_at DESC, id LIMIT ?"
        );

        let mut query = sqlx::query_as::<_, NodeRow>(&sql).bind(label);
        for key in keys {
            let path = attribute_path(key);
            query = query.bind(path.clone()).bind(path).bind(fragment);
        }
        let rows = query
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        nodes(rows)
    }

    async fn create_relationship(
        &self,
        rel_type: RelationType,
        from_id: &str,
        to_id: &str,
        properties: Metadata,
    ) -> Result<Relationship> {
        self.require_node(from_id).await?;
        self.require_node(to_id).await?;
        self.insert_relationship(rel_type, from_id, to_id, properties).await
    }

    async fn merge_relationship(
        &self,
        rel_type: RelationType,
        from_id: &str,
        to_id: &str,
        properties: Metadata,
    ) -> Result<Relationship> {
        self.require_node(from_id).await?;
        self.require_node(to_id).await?;

        let existing: Option<RelationshipRow> = sqlx::query_as(&format!(
            "SELECT {REL_COLUMNS} FROM graph_relationships \
             WHERE rel_type = ? AND ((from_id = ? AND to_id = ?) OR (? AND from_id = ? AND to_id = ?)) \
             ORDER BY created_at, id LIMIT 1"
        ))
        .bind(rel_type.to_string())
        .bind(from_id)
        .bind(to_id)
        .bind(rel_type.is_undirected())
        .bind(to_id)
        .bind(from_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match existing {
            Some(row) => {
                let mut rel = Relationship::try_from(row)?;
                sqlx::query("UPDATE graph_relationships SET properties = ? WHERE id = ?")
                    .bind(serde_json::to_string(&properties)?)
                    .bind(&rel.id)
                    .execute(&self.pool)
                    .await
                    .map_err(db_err)?;
                rel.properties = properties;
                Ok(rel)
            }
            None => self.insert_relationship(rel_type, from_id, to_id, properties).await,
        }
    }

    async fn get_relationship(&self, id: &str) -> Result<Option<Relationship>> {
        let row: Option<RelationshipRow> =
            sqlx::query_as(&format!("SELECT {REL_COLUMNS} FROM graph_relationships WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(Relationship::try_from).transpose()
    }

    async fn delete_relationship(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM graph_relationships WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("relationship {id}")));
        }
        Ok(())
    }

    async fn relationships_between(&self, from_id: &str, to_id: &str) -> Result<Vec<Relationship>> {
        let rows: Vec<RelationshipRow> = sqlx::query_as(&format!(
            "SELECT {REL_COLUMNS} FROM graph_relationships WHERE from_id = ? AND to_id = ? \
             ORDER BY created_at, id"
        ))
        .bind(from_id)
        .bind(to_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        relationships(rows)
    }

    async fn outgoing(&self, node_id: &str, rel_type: Option<RelationType>) -> Result<Vec<Relationship>> {
        let rel_type = rel_type.map(|t| t.to_string());
        let rows: Vec<RelationshipRow> = sqlx::query_as(&format!(
            "SELECT {REL_COLUMNS} FROM graph_relationships \
             WHERE from_id = ? AND (? IS NULL OR rel_type = ?) ORDER BY created_at, id"
        ))
        .bind(node_id)
        .bind(rel_type.clone())
        .bind(rel_type)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        relationships(rows)
    }

    async fn incoming(&self, node_id: &str, rel_type: Option<RelationType>) -> Result<Vec<Relationship>> {
        let rel_type = rel_type.map(|t| t.to_string());
        let rows: Vec<RelationshipRow> = sqlx::query_as(&format!(
            "SELECT {REL_COLUMNS} FROM graph_relationships \
             WHERE to_id = ? AND (? IS NULL OR rel_type = ?) ORDER BY created_at, id"
        ))
        .bind(node_id)
        .bind(rel_type.clone())
        .bind(rel_type)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        relationships(rows)
    }

    async fn traverse(&self, traversal: &Traversal) -> Result<Vec<Node>> {
        traversal.validate()?;
        self.require_node(&traversal.start).await?;

        let (forward, backward) = hop_types(traversal);
        let mut edges = Vec::new();
        if !forward.is_empty() {
            edges.push(format!(
                "SELECT id AS rid, from_id AS src, to_id AS dst FROM graph_relationships WHERE rel_type IN ({})",
                placeholders(forward.len())
            ));
        }
        if !backward.is_empty() {
            edges.push(format!(
                "SELECT id AS rid, to_id AS src, from_id AS dst FROM graph_relationships WHERE rel_type IN ({})",
                placeholders(backward.len())
            ));
        }
        let label_filter = if traversal.target_label.is_some() {
            "AND n.label = ?"
        } else {
            ""
        };

        let sql = format!(
            r#"
            WITH RECURSIVE
                edges(rid, src, dst) AS ({edges}),
                walk(id, depth, path) AS (
                    SELECT ?, 0, ','
                    UNION ALL
                    SELECT edges.dst, walk.depth + 1, walk.path || edges.rid || ','
                    FROM walk JOIN edges ON edges.src = walk.id
                    WHERE walk.depth < ? AND instr(walk.path, ',' || edges.rid || ',') = 0
                )
            SELECT n.id, n.label, n.attributes, n.additional_attributes, n.created_at, n.updated_at
            FROM walk JOIN graph_nodes n ON n.id = walk.id
            WHERE walk.depth >= ? AND (walk.id != ? OR walk.depth = 0) {label_filter}
            GROUP BY n.id
            ORDER BY MIN(walk.depth), n.id
            "#,
            edges = edges.join(" UNION ALL "),
        );

        let mut query = sqlx::query_as::<_, NodeRow>(&sql);
        for rel_type in forward.iter().chain(backward.iter()) {
            query = query.bind(rel_type);
        }
        query = query
            .bind(&traversal.start)
            .bind(traversal.max_depth as i64)
            .bind(traversal.min_depth as i64)
            .bind(&traversal.start);
        if let Some(label) = traversal.target_label {
            query = query.bind(label);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        nodes(rows)
    }
}
