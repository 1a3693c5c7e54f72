//! In-memory graph store.
//!
//! Nodes and relationships live behind one `RwLock`, so a detach delete
//! removes a node and its relationships in a single critical section.
//! Traversal is a breadth-first search over paths; a path never uses the
//! same relationship twice.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{Direction, GraphStore, Node, RelationType, Relationship, Traversal};
use crate::error::{Error, Result};
use crate::models::Metadata;

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Upstream("in-memory graph lock poisoned".into())
}

#[derive(Default)]
struct GraphState {
    nodes: HashMap<String, Node>,
    rels: Vec<Relationship>,
}

impl GraphState {
    fn require_endpoints(&self, from_id: &str, to_id: &str) -> Result<()> {
        for id in [from_id, to_id] {
            if !self.nodes.contains_key(id) {
                return Err(Error::NotFound(format!("node {id}")));
            }
        }
        Ok(())
    }

    fn insert_rel(&mut self, rel_type: RelationType, from_id: &str, to_id: &str, properties: Metadata) -> Relationship {
        let rel = Relationship {
            id: Uuid::new_v4().to_string(),
            rel_type,
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            properties,
            created_at: Utc::now(),
        };
        self.rels.push(rel.clone());
        rel
    }

    /// Hops from `id` under `traversal`'s rules, as `(relationship id, neighbour)`.
    fn hops<'a>(&'a self, id: &'a str, traversal: &'a Traversal) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.rels
            .iter()
            .filter(|r| traversal.rel_types.contains(&r.rel_type))
            .filter_map(move |r| {
                let forward = r.from_id == id;
                let backward = r.to_id == id;
                let direction = if r.rel_type.is_undirected() {
                    Direction::Both
                } else {
                    traversal.direction
                };
                let next = match direction {
                    Direction::Outgoing if forward => r.to_id.as_str(),
                    Direction::Incoming if backward => r.from_id.as_str(),
                    Direction::Both if forward => r.to_id.as_str(),
                    Direction::Both if backward => r.from_id.as_str(),
                    _ => return None,
                };
                Some((r.id.as_str(), next))
            })
    }
}

/// In-memory graph store for tests and embedding.
#[derive(Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page(nodes: Vec<Node>, offset: i64, limit: i64) -> Vec<Node> {
    nodes
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

fn newest_first(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn create_node(&self, mut node: Node) -> Result<Node> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.nodes.contains_key(&node.id) {
            return Err(Error::Conflict(format!("node {} already exists", node.id)));
        }
        if node.created_at.is_none() {
            node.created_at = Some(Utc::now());
        }
        state.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        Ok(self.state.read().map_err(poisoned)?.nodes.get(id).cloned())
    }

    async fn update_node(&self, mut node: Node) -> Result<Node> {
        let mut state = self.state.write().map_err(poisoned)?;
        let existing = state
            .nodes
            .get_mut(&node.id)
            .ok_or_else(|| Error::NotFound(format!("node {}", node.id)))?;
        if existing.label() != node.label() {
            return Err(Error::InvalidInput(format!(
                "node {} is a {}, cannot become a {}",
                node.id,
                existing.label(),
                node.label()
            )));
        }
        node.created_at = existing.created_at;
        node.updated_at = Some(Utc::now());
        *existing = node.clone();
        Ok(node)
    }

    async fn delete_node(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.nodes.remove(id).is_none() {
            return Err(Error::NotFound(format!("node {id}")));
        }
        state.rels.retain(|r| r.from_id != id && r.to_id != id);
        Ok(())
    }

    async fn list_nodes(&self, label: &str, offset: i64, limit: i64) -> Result<Vec<Node>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut nodes: Vec<Node> = state.nodes.values().filter(|n| n.label() == label).cloned().collect();
        newest_first(&mut nodes);
        Ok(page(nodes, offset, limit))
    }

    async fn find_nodes(&self, label: &str, key: &str, value: &serde_json::Value) -> Result<Vec<Node>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut nodes: Vec<Node> = state
            .nodes
            .values()
            .filter(|n| n.label() == label && n.kind.attribute(key).as_ref() == Some(value))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn search_nodes(&self, label: &str, keys: &[&str], fragment: &str, limit: i64) -> Result<Vec<Node>> {
        let needle = fragment.to_lowercase();
        let state = self.state.read().map_err(poisoned)?;
        let mut nodes: Vec<Node> = state
            .nodes
            .values()
            .filter(|n| n.label() == label)
            .filter(|n| {
                keys.iter().any(|key| {
                    n.kind
                        .attribute(key)
                        .and_then(|v| v.as_str().map(str::to_lowercase))
                        .is_some_and(|s| s.contains(&needle))
                })
            })
            .cloned()
            .collect();
        newest_first(&mut nodes);
        Ok(page(nodes, 0, limit))
    }

    async fn create_relationship(
        &self,
        rel_type: RelationType,
        from_id: &str,
        to_id: &str,
        properties: Metadata,
    ) -> Result<Relationship> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.require_endpoints(from_id, to_id)?;
        Ok(state.insert_rel(rel_type, from_id, to_id, properties))
    }

    async fn merge_relationship(
        &self,
        rel_type: RelationType,
        from_id: &str,
        to_id: &str,
        properties: Metadata,
    ) -> Result<Relationship> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.require_endpoints(from_id, to_id)?;
        if let Some(existing) = state.rels.iter_mut().find(|r| r.joins(rel_type, from_id, to_id)) {
            existing.properties = properties;
            return Ok(existing.clone());
        }
        Ok(state.insert_rel(rel_type, from_id, to_id, properties))
    }

    async fn get_relationship(&self, id: &str) -> Result<Option<Relationship>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.rels.iter().find(|r| r.id == id).cloned())
    }

    async fn delete_relationship(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let before = state.rels.len();
        state.rels.retain(|r| r.id != id);
        if state.rels.len() == before {
            return Err(Error::NotFound(format!("relationship {id}")));
        }
        Ok(())
    }

    async fn relationships_between(&self, from_id: &str, to_id: &str) -> Result<Vec<Relationship>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .rels
            .iter()
            .filter(|r| r.from_id == from_id && r.to_id == to_id)
            .cloned()
            .collect())
    }

    async fn outgoing(&self, node_id: &str, rel_type: Option<RelationType>) -> Result<Vec<Relationship>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .rels
            .iter()
            .filter(|r| r.from_id == node_id && rel_type.map_or(true, |t| r.rel_type == t))
            .cloned()
            .collect())
    }

    async fn incoming(&self, node_id: &str, rel_type: Option<RelationType>) -> Result<Vec<Relationship>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .rels
            .iter()
            .filter(|r| r.to_id == node_id && rel_type.map_or(true, |t| r.rel_type == t))
            .cloned()
            .collect())
    }

    async fn traverse(&self, traversal: &Traversal) -> Result<Vec<Node>> {
        traversal.validate()?;
        let state = self.state.read().map_err(poisoned)?;
        if !state.nodes.contains_key(&traversal.start) {
            return Err(Error::NotFound(format!("node {}", traversal.start)));
        }

        let mut reached: HashMap<&str, u32> = HashMap::new();
        let mut queue: VecDeque<(&str, Vec<&str>)> = VecDeque::new();
        queue.push_back((traversal.start.as_str(), Vec::new()));

        while let Some((id, path)) = queue.pop_front() {
            let depth = path.len() as u32;
            let is_start = id == traversal.start;
            if depth >= traversal.min_depth && (!is_start || depth == 0) {
                reached.entry(id).or_insert(depth);
            }
            if depth == traversal.max_depth {
                continue;
            }
            for (rel_id, next) in state.hops(id, traversal) {
                if path.contains(&rel_id) {
                    continue;
                }
                let mut extended = path.clone();
                extended.push(rel_id);
                queue.push_back((next, extended));
            }
        }

        let mut found: Vec<(u32, &Node)> = reached
            .into_iter()
            .filter_map(|(id, depth)| state.nodes.get(id).map(|n| (depth, n)))
            .filter(|(_, n)| traversal.target_label.map_or(true, |l| n.label() == l))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(found.into_iter().map(|(_, n)| n.clone()).collect())
    }
}
