//! Knowledge graph: typed nodes, one relationship primitive, bounded traversal.
//!
//! Four schemas share the graph:
//!
//! | Facade | Node labels |
//! |--------|-------------|
//! | [`DocumentGraph`] | Document, Entity |
//! | [`KnowledgeGraph`] | KnowledgeDocument, Topic, Concept, KnowledgeEntity |
//! | [`NovelGraph`] | Novel, WorldSetting, Location, Character, Faction |
//! | [`CodeGraph`] | CodeFile, Class, Function, Package |
//!
//! All of them go through one [`GraphStore`]. Relationship endpoints must
//! exist, and deleting a node deletes every relationship touching it.
//!
//! The graph is a projection of the relational side and is never
//! cascade-deleted by it; [`GraphSync`] brings it up to date per document.

pub mod code;
pub mod document;
pub mod knowledge;
pub mod memory;
pub mod node;
pub mod novel;
pub mod relation;
pub mod sync;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::Metadata;

pub use code::CodeGraph;
pub use document::DocumentGraph;
pub use knowledge::KnowledgeGraph;
pub use node::{Domain, Node, NodeKind, NodeSchema, Typed};
pub use novel::NovelGraph;
pub use relation::{
    CodeRelation, DocumentRelation, KnowledgeRelation, NovelRelation, RelationType, Relationship,
};
pub use sync::GraphSync;

/// Upper bound on any traversal depth.
pub const MAX_TRAVERSAL_DEPTH: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// A bounded variable-length traversal from one node.
///
/// A node is reported when some path of length `min_depth..=max_depth`
/// over the allowed relationship types reaches it. A path never uses the
/// same relationship twice, so a cycle cannot be walked around to pad the
/// length. The start node is reported only when `min_depth == 0`.
#[derive(Debug, Clone)]
pub struct Traversal {
    pub start: String,
    pub rel_types: Vec<RelationType>,
    pub direction: Direction,
    pub min_depth: u32,
    pub max_depth: u32,
    /// Only report nodes with this label.
    pub target_label: Option<&'static str>,
}

impl Traversal {
    pub fn new(start: impl Into<String>, rel_types: Vec<RelationType>) -> Self {
        Self {
            start: start.into(),
            rel_types,
            direction: Direction::Outgoing,
            min_depth: 1,
            max_depth: 1,
            target_label: None,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn depth(mut self, min_depth: u32, max_depth: u32) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }

    pub fn target(mut self, label: &'static str) -> Self {
        self.target_label = Some(label);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.rel_types.is_empty() {
            return Err(Error::InvalidInput("traversal needs at least one relationship type".into()));
        }
        if self.min_depth > self.max_depth {
            return Err(Error::InvalidInput(format!(
                "min_depth {} exceeds max_depth {}",
                self.min_depth, self.max_depth
            )));
        }
        if self.max_depth > MAX_TRAVERSAL_DEPTH {
            return Err(Error::InvalidInput(format!(
                "max_depth {} exceeds the limit of {MAX_TRAVERSAL_DEPTH}",
                self.max_depth
            )));
        }
        Ok(())
    }
}

/// Relationship types followed by [`GraphStore::get_dependencies`].
pub fn dependency_types() -> Vec<RelationType> {
    vec![
        CodeRelation::Inherits.into(),
        CodeRelation::Implements.into(),
        CodeRelation::DependsOn.into(),
        CodeRelation::Imports.into(),
    ]
}

/// Relationship types followed by [`GraphStore::get_related`].
pub fn related_types() -> Vec<RelationType> {
    vec![
        KnowledgeRelation::References.into(),
        KnowledgeRelation::RelatedTo.into(),
        DocumentRelation::References.into(),
        DocumentRelation::RelatedTo.into(),
    ]
}

/// Graph persistence.
///
/// Implementations must be `Send + Sync` to work with async runtimes.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Stamps `created_at` when unset. `Conflict` if the id is taken.
    async fn create_node(&self, node: Node) -> Result<Node>;

    async fn get_node(&self, id: &str) -> Result<Option<Node>>;

    /// Full attribute replace. Keeps `created_at` and stamps `updated_at`.
    ///
    /// `NotFound` if missing; `InvalidInput` if the label would change.
    async fn update_node(&self, node: Node) -> Result<Node>;

    /// Detach delete: the node and every relationship touching it.
    /// `NotFound` if missing.
    async fn delete_node(&self, id: &str) -> Result<()>;

    /// Nodes with `label`, newest first, then by id.
    async fn list_nodes(&self, label: &str, offset: i64, limit: i64) -> Result<Vec<Node>>;

    /// Nodes with `label` whose top-level attribute `key` equals `value`.
    async fn find_nodes(&self, label: &str, key: &str, value: &serde_json::Value) -> Result<Vec<Node>>;

    /// Case-insensitive substring search over string attributes `keys`.
    async fn search_nodes(&self, label: &str, keys: &[&str], fragment: &str, limit: i64) -> Result<Vec<Node>>;

    /// `NotFound` when either endpoint is missing.
    async fn create_relationship(
        &self,
        rel_type: RelationType,
        from_id: &str,
        to_id: &str,
        properties: Metadata,
    ) -> Result<Relationship>;

    /// Create unless a relationship of this type already joins the two
    /// nodes, in which case its properties are replaced.
    async fn merge_relationship(
        &self,
        rel_type: RelationType,
        from_id: &str,
        to_id: &str,
        properties: Metadata,
    ) -> Result<Relationship>;

    async fn get_relationship(&self, id: &str) -> Result<Option<Relationship>>;

    /// `NotFound` if missing.
    async fn delete_relationship(&self, id: &str) -> Result<()>;

    /// Relationships stored from `from_id` to `to_id`.
    async fn relationships_between(&self, from_id: &str, to_id: &str) -> Result<Vec<Relationship>>;

    async fn outgoing(&self, node_id: &str, rel_type: Option<RelationType>) -> Result<Vec<Relationship>>;

    async fn incoming(&self, node_id: &str, rel_type: Option<RelationType>) -> Result<Vec<Relationship>>;

    /// Distinct nodes reachable under `traversal`, nearest first, then by id.
    ///
    /// `NotFound` if the start node is missing.
    async fn traverse(&self, traversal: &Traversal) -> Result<Vec<Node>>;

    /// Outgoing `INHERITS|IMPLEMENTS|DEPENDS_ON|IMPORTS` within the bounds.
    async fn get_dependencies(&self, id: &str, min_depth: u32, max_depth: u32) -> Result<Vec<Node>> {
        self.traverse(&Traversal::new(id, dependency_types()).depth(min_depth, max_depth))
            .await
    }

    /// `REFERENCES|RELATED_TO` in either direction, up to `depth` hops.
    async fn get_related(&self, id: &str, depth: u32) -> Result<Vec<Node>> {
        self.traverse(
            &Traversal::new(id, related_types())
                .direction(Direction::Both)
                .depth(1, depth.max(1)),
        )
        .await
    }
}

/// Per-type CRUD shared by the domain facades.
///
/// Every operation checks that `T` belongs to the facade's domain and
/// that the stored node has `T`'s label; a node of another type is
/// reported as `NotFound`.
#[async_trait]
pub trait DomainGraph: Send + Sync {
    const DOMAIN: Domain;

    fn store(&self) -> &dyn GraphStore;

    async fn create<T: NodeSchema>(&self, node: Typed<T>) -> Result<Typed<T>> {
        check_domain::<T>(Self::DOMAIN)?;
        Typed::from_node(self.store().create_node(node.into_node()).await?)
    }

    async fn get<T: NodeSchema>(&self, id: &str) -> Result<Typed<T>> {
        check_domain::<T>(Self::DOMAIN)?;
        match self.store().get_node(id).await? {
            Some(node) if node.label() == T::LABEL => Typed::from_node(node),
            _ => Err(Error::NotFound(format!("{} {id}", T::LABEL))),
        }
    }

    async fn update<T: NodeSchema>(&self, node: Typed<T>) -> Result<Typed<T>> {
        self.get::<T>(&node.id).await?;
        Typed::from_node(self.store().update_node(node.into_node()).await?)
    }

    async fn delete<T: NodeSchema>(&self, id: &str) -> Result<()> {
        self.get::<T>(id).await?;
        self.store().delete_node(id).await
    }

    async fn list<T: NodeSchema>(&self, offset: i64, limit: i64) -> Result<Vec<Typed<T>>> {
        check_domain::<T>(Self::DOMAIN)?;
        self.store()
            .list_nodes(T::LABEL, offset, limit)
            .await?
            .into_iter()
            .map(Typed::<T>::from_node)
            .collect()
    }
}

fn check_domain<T: NodeSchema>(domain: Domain) -> Result<()> {
    if T::DOMAIN == domain {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{} belongs to the {} graph, not the {domain} graph",
            T::LABEL,
            T::DOMAIN
        )))
    }
}

/// Resolve relationship endpoints to typed nodes, skipping other labels.
pub(crate) async fn resolve<T: NodeSchema>(
    store: &dyn GraphStore,
    ids: impl IntoIterator<Item = String>,
) -> Result<Vec<Typed<T>>> {
    let mut out = Vec::new();
    for id in ids {
        if let Some(node) = store.get_node(&id).await? {
            if node.label() == T::LABEL {
                out.push(Typed::from_node(node)?);
            }
        }
    }
    Ok(out)
}

/// Fetch `id` and require label `T`, reporting a miss as `NotFound`.
pub(crate) async fn require<T: NodeSchema>(store: &dyn GraphStore, id: &str) -> Result<Typed<T>> {
    match store.get_node(id).await? {
        Some(node) if node.label() == T::LABEL => Typed::from_node(node),
        _ => Err(Error::NotFound(format!("{} {id}", T::LABEL))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traversal_validation() {
        let ok = Traversal::new("a", dependency_types()).depth(1, 3);
        assert!(ok.validate().is_ok());
        assert!(Traversal::new("a", vec![]).validate().is_err());
        assert!(Traversal::new("a", dependency_types()).depth(3, 1).validate().is_err());
        assert!(Traversal::new("a", dependency_types()).depth(0, 11).validate().is_err());
    }
}
