//! Projection of the document registry into the graph.
//!
//! Node ids reuse the relational keys: a document node's id is its
//! `doc_id`, an entity node's id is the entity row id.

use std::collections::HashSet;
use std::sync::Arc;

use super::node::{DocumentNode, EntityNode};
use super::{
    require, resolve, Direction, Domain, DomainGraph, DocumentRelation, GraphStore, NodeSchema,
    Relationship, Typed,
};
use crate::error::Result;
use crate::models::{Document, Entity, Metadata};

/// Cap on [`DocumentGraph::find_entities_by_name`] results.
pub const NAME_SEARCH_LIMIT: i64 = 50;

pub struct DocumentGraph {
    store: Arc<dyn GraphStore>,
}

impl DomainGraph for DocumentGraph {
    const DOMAIN: Domain = Domain::Document;

    fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }
}

pub fn document_node(doc: &Document) -> Typed<DocumentNode> {
    Typed::new(
        doc.doc_id.clone(),
        DocumentNode {
            doc_name: doc.doc_name.clone(),
            doc_hash: doc.doc_hash.clone(),
            file_path: doc.file_path.clone(),
            file_type: doc.file_type.clone(),
            ctime: doc.ctime,
        },
    )
}

pub fn entity_node(entity: &Entity) -> Typed<EntityNode> {
    Typed::new(
        entity.id.to_string(),
        EntityNode {
            entity_type: entity.entity_type.clone(),
            entity_name: entity.entity_name.clone(),
            entity_value: entity.entity_value.clone(),
            metadata: entity.metadata.clone(),
            ctime: entity.ctime,
        },
    )
}

impl DocumentGraph {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Create the node, or fully replace it when it already exists.
    pub async fn upsert<T: NodeSchema>(&self, node: Typed<T>) -> Result<Typed<T>> {
        match self.store.get_node(&node.id).await? {
            Some(_) => self.update(node).await,
            None => self.create(node).await,
        }
    }

    /// `CONTAINS` from document to entity, merged.
    pub async fn link_entity(&self, doc_id: &str, entity_id: &str, properties: Metadata) -> Result<Relationship> {
        require::<DocumentNode>(self.store(), doc_id).await?;
        require::<EntityNode>(self.store(), entity_id).await?;
        self.store
            .merge_relationship(DocumentRelation::Contains.into(), doc_id, entity_id, properties)
            .await
    }

    /// Undirected `SIMILAR_TO` carrying `score`, merged.
    pub async fn link_similar(&self, a: &str, b: &str, score: f64) -> Result<Relationship> {
        require::<DocumentNode>(self.store(), a).await?;
        require::<DocumentNode>(self.store(), b).await?;
        let mut properties = Metadata::new();
        properties.insert("score".into(), score.into());
        self.store
            .merge_relationship(DocumentRelation::SimilarTo.into(), a, b, properties)
            .await
    }

    /// `REFERENCES` from one document to another, merged.
    pub async fn link_reference(&self, from_doc: &str, to_doc: &str) -> Result<Relationship> {
        require::<DocumentNode>(self.store(), from_doc).await?;
        require::<DocumentNode>(self.store(), to_doc).await?;
        self.store
            .merge_relationship(DocumentRelation::References.into(), from_doc, to_doc, Metadata::new())
            .await
    }

    /// Similar documents, highest score first.
    pub async fn find_similar(&self, doc_id: &str, limit: usize) -> Result<Vec<(Typed<DocumentNode>, f64)>> {
        require::<DocumentNode>(self.store(), doc_id).await?;
        let rel_type = Some(DocumentRelation::SimilarTo.into());
        let mut rels = self.store.outgoing(doc_id, rel_type).await?;
        rels.extend(self.store.incoming(doc_id, rel_type).await?);

        let mut scored = Vec::with_capacity(rels.len());
        for rel in rels {
            let score = rel.properties.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0);
            if let Some(node) = self.store.get_node(rel.other_end(doc_id)).await? {
                if node.label() == DocumentNode::LABEL {
                    scored.push((Typed::from_node(node)?, score));
                }
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Detach-delete entity nodes linked from `doc_id` whose ids are not in
    /// `keep`. Returns how many were removed.
    pub async fn prune_entities(&self, doc_id: &str, keep: &HashSet<String>) -> Result<usize> {
        let rels = self
            .store
            .outgoing(doc_id, Some(DocumentRelation::Contains.into()))
            .await?;
        let mut removed = 0;
        for rel in rels {
            if keep.contains(&rel.to_id) {
                continue;
            }
            self.store.delete_node(&rel.to_id).await?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Entities a document contains, by name.
    pub async fn entities_of(&self, doc_id: &str) -> Result<Vec<Typed<EntityNode>>> {
        let rels = self
            .store
            .outgoing(doc_id, Some(DocumentRelation::Contains.into()))
            .await?;
        let mut entities = resolve::<EntityNode>(self.store(), rels.into_iter().map(|r| r.to_id)).await?;
        entities.sort_by(|a, b| a.attrs.entity_name.cmp(&b.attrs.entity_name));
        Ok(entities)
    }

    /// Documents containing an entity, newest first.
    pub async fn documents_mentioning(&self, entity_id: &str) -> Result<Vec<Typed<DocumentNode>>> {
        let rels = self
            .store
            .incoming(entity_id, Some(DocumentRelation::Contains.into()))
            .await?;
        let mut docs = resolve::<DocumentNode>(self.store(), rels.into_iter().map(|r| r.from_id)).await?;
        docs.sort_by(|a, b| b.attrs.ctime.cmp(&a.attrs.ctime));
        Ok(docs)
    }

    /// Entities of one type, by name.
    pub async fn entities_by_type(&self, entity_type: &str, limit: usize) -> Result<Vec<Typed<EntityNode>>> {
        let nodes = self
            .store
            .find_nodes(EntityNode::LABEL, "entity_type", &entity_type.into())
            .await?;
        let mut entities = nodes
            .into_iter()
            .map(Typed::<EntityNode>::from_node)
            .collect::<Result<Vec<_>>>()?;
        entities.sort_by(|a, b| a.attrs.entity_name.cmp(&b.attrs.entity_name));
        entities.truncate(limit);
        Ok(entities)
    }

    /// Entities whose name contains `fragment`, by name, at most 50.
    pub async fn find_entities_by_name(&self, fragment: &str) -> Result<Vec<Typed<EntityNode>>> {
        let mut entities = self
            .store
            .search_nodes(EntityNode::LABEL, &["entity_name"], fragment, i64::MAX)
            .await?
            .into_iter()
            .map(Typed::<EntityNode>::from_node)
            .collect::<Result<Vec<_>>>()?;
        entities.sort_by(|a, b| a.attrs.entity_name.cmp(&b.attrs.entity_name));
        entities.truncate(NAME_SEARCH_LIMIT as usize);
        Ok(entities)
    }

    /// Documents linked by `REFERENCES|RELATED_TO`, either direction.
    pub async fn related_documents(&self, doc_id: &str, depth: u32) -> Result<Vec<Typed<DocumentNode>>> {
        require::<DocumentNode>(self.store(), doc_id).await?;
        let traversal = super::Traversal::new(
            doc_id,
            vec![DocumentRelation::References.into(), DocumentRelation::RelatedTo.into()],
        )
        .direction(Direction::Both)
        .depth(1, depth.max(1))
        .target(DocumentNode::LABEL);
        self.store
            .traverse(&traversal)
            .await?
            .into_iter()
            .map(Typed::<DocumentNode>::from_node)
            .collect()
    }
}
