//! Novel world graph: novels and the settings, places, characters and
//! factions that belong to them.

use std::sync::Arc;

use super::node::{CharacterNode, FactionNode, LocationNode, NovelNode, WorldSettingNode};
use super::{
    require, resolve, Domain, DomainGraph, GraphStore, NodeSchema, NovelRelation, RelationType,
    Relationship, Typed,
};
use crate::error::{Error, Result};
use crate::models::Metadata;

pub struct NovelGraph {
    store: Arc<dyn GraphStore>,
}

impl DomainGraph for NovelGraph {
    const DOMAIN: Domain = Domain::Novel;

    fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }
}

impl NovelGraph {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn create_novel(&self, novel: Typed<NovelNode>) -> Result<Typed<NovelNode>> {
        self.create(novel).await
    }

    pub async fn create_world_setting(&self, node: Typed<WorldSettingNode>) -> Result<Typed<WorldSettingNode>> {
        let novel_id = node.attrs.novel_id.clone();
        self.create_in_novel(&novel_id, node, NovelRelation::HasWorldSetting).await
    }

    pub async fn create_location(&self, node: Typed<LocationNode>) -> Result<Typed<LocationNode>> {
        let novel_id = node.attrs.novel_id.clone();
        self.create_in_novel(&novel_id, node, NovelRelation::HasLocation).await
    }

    pub async fn create_character(&self, node: Typed<CharacterNode>) -> Result<Typed<CharacterNode>> {
        let novel_id = node.attrs.novel_id.clone();
        self.create_in_novel(&novel_id, node, NovelRelation::HasCharacter).await
    }

    pub async fn create_faction(&self, node: Typed<FactionNode>) -> Result<Typed<FactionNode>> {
        let novel_id = node.attrs.novel_id.clone();
        self.create_in_novel(&novel_id, node, NovelRelation::HasFaction).await
    }

    /// Characters of a novel, by name.
    pub async fn list_characters(&self, novel_id: &str) -> Result<Vec<Typed<CharacterNode>>> {
        require::<NovelNode>(self.store(), novel_id).await?;
        let rels = self
            .store
            .outgoing(novel_id, Some(NovelRelation::HasCharacter.into()))
            .await?;
        let mut characters =
            resolve::<CharacterNode>(self.store(), rels.into_iter().map(|r| r.to_id)).await?;
        characters.sort_by(|a, b| a.attrs.name.cmp(&b.attrs.name));
        Ok(characters)
    }

    /// Link two characters with `KNOWS` or `ENEMY_OF`.
    pub async fn relate_characters(
        &self,
        from_id: &str,
        to_id: &str,
        relation: NovelRelation,
        properties: Metadata,
    ) -> Result<Relationship> {
        if !matches!(relation, NovelRelation::Knows | NovelRelation::EnemyOf) {
            return Err(Error::InvalidInput(format!(
                "{} does not link two characters",
                relation.as_str()
            )));
        }
        require::<CharacterNode>(self.store(), from_id).await?;
        require::<CharacterNode>(self.store(), to_id).await?;
        self.store
            .create_relationship(relation.into(), from_id, to_id, properties)
            .await
    }

    /// Relationships between this character and other characters, either direction.
    pub async fn character_relationships(&self, character_id: &str) -> Result<Vec<Relationship>> {
        require::<CharacterNode>(self.store(), character_id).await?;
        let mut rels = self.store.outgoing(character_id, None).await?;
        rels.extend(self.store.incoming(character_id, None).await?);
        let mut out = Vec::new();
        for rel in rels {
            let other = rel.other_end(character_id).to_string();
            if let Some(node) = self.store.get_node(&other).await? {
                if node.label() == CharacterNode::LABEL {
                    out.push(rel);
                }
            }
        }
        Ok(out)
    }

    /// Remove relationships of type `relation` stored from `from_id` to `to_id`.
    pub async fn unrelate(&self, from_id: &str, to_id: &str, relation: NovelRelation) -> Result<usize> {
        let rels = self.store.relationships_between(from_id, to_id).await?;
        let mut removed = 0;
        for rel in rels.into_iter().filter(|r| r.rel_type == RelationType::from(relation)) {
            self.store.delete_relationship(&rel.id).await?;
            removed += 1;
        }
        Ok(removed)
    }

    pub async fn place_character(&self, character_id: &str, location_id: &str) -> Result<Relationship> {
        require::<CharacterNode>(self.store(), character_id).await?;
        require::<LocationNode>(self.store(), location_id).await?;
        self.store
            .merge_relationship(NovelRelation::LocatedIn.into(), character_id, location_id, Metadata::new())
            .await
    }

    pub async fn join_faction(&self, character_id: &str, faction_id: &str) -> Result<Relationship> {
        require::<CharacterNode>(self.store(), character_id).await?;
        require::<FactionNode>(self.store(), faction_id).await?;
        self.store
            .merge_relationship(NovelRelation::MemberOf.into(), character_id, faction_id, Metadata::new())
            .await
    }

    async fn create_in_novel<T: NodeSchema>(
        &self,
        novel_id: &str,
        node: Typed<T>,
        relation: NovelRelation,
    ) -> Result<Typed<T>> {
        require::<NovelNode>(self.store(), novel_id).await?;
        let created = self.create(node).await?;
        self.store
            .create_relationship(relation.into(), novel_id, &created.id, Metadata::new())
            .await?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::InMemoryGraphStore;
    use crate::graph::node::TopicNode;
    use crate::ErrorKind;

    fn graph() -> NovelGraph {
        NovelGraph::new(Arc::new(InMemoryGraphStore::new()))
    }

    fn novel() -> Typed<NovelNode> {
        Typed::new(
            "n1",
            NovelNode {
                title: "The Long Road".into(),
                author: "A. Writer".into(),
                genre: "fantasy".into(),
                description: String::new(),
            },
        )
    }

    fn character(id: &str, name: &str) -> Typed<CharacterNode> {
        Typed::new(
            id,
            CharacterNode {
                novel_id: "n1".into(),
                name: name.into(),
                age: 30,
                gender: "f".into(),
                role: "supporting".into(),
                personality: String::new(),
                backstory: String::new(),
                attributes: Metadata::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_characters_linked_and_listed_by_name() {
        let g = graph();
        g.create_novel(novel()).await.unwrap();
        g.create_character(character("c2", "Zara")).await.unwrap();
        g.create_character(character("c1", "Ada")).await.unwrap();

        let names: Vec<String> = g
            .list_characters("n1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.attrs.name)
            .collect();
        assert_eq!(names, vec!["Ada", "Zara"]);
    }

    #[tokio::test]
    async fn test_child_requires_existing_novel() {
        let g = graph();
        let err = g.create_character(character("c1", "Ada")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(g.get::<CharacterNode>("c1").await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_character_relations() {
        let g = graph();
        g.create_novel(novel()).await.unwrap();
        g.create_character(character("c1", "Ada")).await.unwrap();
        g.create_character(character("c2", "Zara")).await.unwrap();

        g.relate_characters("c1", "c2", NovelRelation::EnemyOf, Metadata::new())
            .await
            .unwrap();
        let err = g
            .relate_characters("c1", "c2", NovelRelation::HasFaction, Metadata::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        // HAS_CHARACTER from the novel is not a character relationship.
        assert_eq!(g.character_relationships("c2").await.unwrap().len(), 1);
        assert_eq!(g.unrelate("c1", "c2", NovelRelation::EnemyOf).await.unwrap(), 1);
        assert!(g.character_relationships("c2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_character_detaches() {
        let g = graph();
        g.create_novel(novel()).await.unwrap();
        g.create_character(character("c1", "Ada")).await.unwrap();
        g.delete::<CharacterNode>("c1").await.unwrap();
        assert!(g.list_characters("n1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_replace_update() {
        let g = graph();
        g.create_novel(novel()).await.unwrap();
        let mut n = g.get::<NovelNode>("n1").await.unwrap();
        n.attrs.genre = "science fiction".into();
        let updated = g.update(n).await.unwrap();
        assert_eq!(updated.attrs.genre, "science fiction");
        assert!(updated.updated_at.is_some());
        assert_eq!(g.list::<NovelNode>(0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_domain_type_rejected() {
        let g = graph();
        let err = g.list::<TopicNode>(0, 10).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
