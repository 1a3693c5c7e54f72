//! General knowledge base graph: documents, topics, concepts, entities.

use std::sync::Arc;

use super::node::{ConceptNode, KnowledgeDocumentNode, KnowledgeEntityNode, TopicNode};
use super::{
    require, Direction, Domain, DomainGraph, GraphStore, KnowledgeRelation, NodeSchema,
    Relationship, Traversal, Typed,
};
use crate::error::Result;
use crate::models::Metadata;

/// Depth limit of [`KnowledgeGraph::topic_hierarchy`].
pub const TOPIC_HIERARCHY_DEPTH: u32 = 5;

pub struct KnowledgeGraph {
    store: Arc<dyn GraphStore>,
}

impl DomainGraph for KnowledgeGraph {
    const DOMAIN: Domain = Domain::Knowledge;

    fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }
}

impl KnowledgeGraph {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn create_document(&self, doc: Typed<KnowledgeDocumentNode>) -> Result<Typed<KnowledgeDocumentNode>> {
        self.create(doc).await
    }

    pub async fn create_topic(&self, topic: Typed<TopicNode>) -> Result<Typed<TopicNode>> {
        self.create(topic).await
    }

    pub async fn create_concept(&self, concept: Typed<ConceptNode>) -> Result<Typed<ConceptNode>> {
        self.create(concept).await
    }

    pub async fn create_entity(&self, entity: Typed<KnowledgeEntityNode>) -> Result<Typed<KnowledgeEntityNode>> {
        self.create(entity).await
    }

    /// Documents whose title or content contains `keyword`, ignoring case.
    pub async fn search_documents(&self, keyword: &str, limit: i64) -> Result<Vec<Typed<KnowledgeDocumentNode>>> {
        self.store
            .search_nodes(KnowledgeDocumentNode::LABEL, &["title", "content"], keyword, limit)
            .await?
            .into_iter()
            .map(Typed::<KnowledgeDocumentNode>::from_node)
            .collect()
    }

    /// `COVERS`: a document covers a topic.
    pub async fn link_document_topic(&self, doc_id: &str, topic_id: &str) -> Result<Relationship> {
        self.link::<KnowledgeDocumentNode, TopicNode>(KnowledgeRelation::Covers, doc_id, topic_id)
            .await
    }

    /// `BELONGS_TO`: a concept belongs to a topic.
    pub async fn link_concept_topic(&self, concept_id: &str, topic_id: &str) -> Result<Relationship> {
        self.link::<ConceptNode, TopicNode>(KnowledgeRelation::BelongsTo, concept_id, topic_id)
            .await
    }

    /// `CONTAINS`: a parent topic contains a subtopic.
    pub async fn add_subtopic(&self, parent_id: &str, child_id: &str) -> Result<Relationship> {
        self.link::<TopicNode, TopicNode>(KnowledgeRelation::Contains, parent_id, child_id)
            .await
    }

    pub async fn link_reference(&self, from_doc: &str, to_doc: &str) -> Result<Relationship> {
        self.link::<KnowledgeDocumentNode, KnowledgeDocumentNode>(KnowledgeRelation::References, from_doc, to_doc)
            .await
    }

    pub async fn relate_documents(&self, a: &str, b: &str) -> Result<Relationship> {
        self.link::<KnowledgeDocumentNode, KnowledgeDocumentNode>(KnowledgeRelation::RelatedTo, a, b)
            .await
    }

    /// `MENTIONED_IN`: an entity is mentioned in a document.
    pub async fn mention(&self, entity_id: &str, doc_id: &str) -> Result<Relationship> {
        self.link::<KnowledgeEntityNode, KnowledgeDocumentNode>(KnowledgeRelation::MentionedIn, entity_id, doc_id)
            .await
    }

    /// `DERIVED_FROM`: one concept derived from another.
    pub async fn derive_concept(&self, concept_id: &str, source_id: &str) -> Result<Relationship> {
        self.link::<ConceptNode, ConceptNode>(KnowledgeRelation::DerivedFrom, concept_id, source_id)
            .await
    }

    /// Documents linked by `REFERENCES|RELATED_TO` in either direction,
    /// up to `depth` hops.
    pub async fn related_documents(&self, doc_id: &str, depth: u32) -> Result<Vec<Typed<KnowledgeDocumentNode>>> {
        require::<KnowledgeDocumentNode>(self.store(), doc_id).await?;
        let traversal = Traversal::new(
            doc_id,
            vec![KnowledgeRelation::References.into(), KnowledgeRelation::RelatedTo.into()],
        )
        .direction(Direction::Both)
        .depth(1, depth.max(1))
        .target(KnowledgeDocumentNode::LABEL);
        self.store
            .traverse(&traversal)
            .await?
            .into_iter()
            .map(Typed::<KnowledgeDocumentNode>::from_node)
            .collect()
    }

    /// The root topic and its subtopics down to five levels, by level then name.
    pub async fn topic_hierarchy(&self, root_id: &str) -> Result<Vec<Typed<TopicNode>>> {
        require::<TopicNode>(self.store(), root_id).await?;
        let traversal = Traversal::new(root_id, vec![KnowledgeRelation::Contains.into()])
            .depth(0, TOPIC_HIERARCHY_DEPTH)
            .target(TopicNode::LABEL);
        let mut topics = self
            .store
            .traverse(&traversal)
            .await?
            .into_iter()
            .map(Typed::<TopicNode>::from_node)
            .collect::<Result<Vec<_>>>()?;
        topics.sort_by(|a, b| {
            a.attrs
                .level
                .cmp(&b.attrs.level)
                .then_with(|| a.attrs.name.cmp(&b.attrs.name))
        });
        Ok(topics)
    }

    async fn link<F: NodeSchema, T: NodeSchema>(
        &self,
        relation: KnowledgeRelation,
        from_id: &str,
        to_id: &str,
    ) -> Result<Relationship> {
        require::<F>(self.store(), from_id).await?;
        require::<T>(self.store(), to_id).await?;
        self.store
            .merge_relationship(relation.into(), from_id, to_id, Metadata::new())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::InMemoryGraphStore;
    use crate::ErrorKind;

    fn graph() -> KnowledgeGraph {
        KnowledgeGraph::new(Arc::new(InMemoryGraphStore::new()))
    }

    fn doc(id: &str, title: &str, content: &str) -> Typed<KnowledgeDocumentNode> {
        Typed::new(
            id,
            KnowledgeDocumentNode {
                title: title.into(),
                category: "notes".into(),
                content: content.into(),
                tags: vec![],
            },
        )
    }

    fn topic(id: &str, name: &str, level: i64) -> Typed<TopicNode> {
        Typed::new(
            id,
            TopicNode {
                name: name.into(),
                description: String::new(),
                level,
            },
        )
    }

    #[tokio::test]
    async fn test_search_title_or_content() {
        let g = graph();
        g.create_document(doc("d1", "Async Rust", "futures and executors")).await.unwrap();
        g.create_document(doc("d2", "Cooking", "how to make RUST-coloured sauce")).await.unwrap();
        g.create_document(doc("d3", "Gardening", "soil")).await.unwrap();

        let hits = g.search_documents("rust", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(g.search_documents("rust", 1).await.unwrap().len(), 1);
        assert!(g.search_documents("python", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_topic_hierarchy_includes_root_in_level_order() {
        let g = graph();
        g.create_topic(topic("root", "Programming", 0)).await.unwrap();
        g.create_topic(topic("rs", "Rust", 1)).await.unwrap();
        g.create_topic(topic("go", "Go", 1)).await.unwrap();
        g.create_topic(topic("own", "Ownership", 2)).await.unwrap();
        g.add_subtopic("root", "rs").await.unwrap();
        g.add_subtopic("root", "go").await.unwrap();
        g.add_subtopic("rs", "own").await.unwrap();

        let names: Vec<String> = g
            .topic_hierarchy("root")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.attrs.name)
            .collect();
        assert_eq!(names, vec!["Programming", "Go", "Rust", "Ownership"]);
    }

    #[tokio::test]
    async fn test_related_documents_both_directions() {
        let g = graph();
        for id in ["a", "b", "c", "d"] {
            g.create_document(doc(id, id, "")).await.unwrap();
        }
        g.link_reference("b", "a").await.unwrap();
        g.relate_documents("b", "c").await.unwrap();
        g.relate_documents("c", "d").await.unwrap();

        let ids = |docs: Vec<Typed<KnowledgeDocumentNode>>| docs.into_iter().map(|d| d.id).collect::<Vec<_>>();
        assert_eq!(ids(g.related_documents("a", 1).await.unwrap()), vec!["b"]);
        assert_eq!(ids(g.related_documents("a", 2).await.unwrap()), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_links_check_endpoint_types() {
        let g = graph();
        g.create_document(doc("d1", "t", "c")).await.unwrap();
        g.create_topic(topic("t1", "Topic", 0)).await.unwrap();
        g.link_document_topic("d1", "t1").await.unwrap();

        let err = g.link_document_topic("t1", "d1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
