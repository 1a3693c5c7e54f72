//! Graph store contract against the SQLite implementation.

use std::sync::Arc;

use ragweave::config::Config;
use ragweave::sqlite_graph::SqliteGraphStore;
use ragweave::{db, migrate};
use ragweave_core::graph::node::{ClassNode, CodeFileNode, FunctionNode, NodeKind, TopicNode};
use ragweave_core::graph::{
    CodeGraph, CodeRelation, Direction, DocumentRelation, GraphStore, KnowledgeRelation, Node,
    RelationType, Traversal, Typed,
};
use ragweave_core::models::Metadata;
use ragweave_core::ErrorKind;
use tempfile::TempDir;

async fn open_store() -> (TempDir, SqliteGraphStore) {
    let tmp = TempDir::new().unwrap();
    let config: Config = toml::from_str(&format!(
        "[db]\npath = \"{}/graph.sqlite\"\n",
        tmp.path().display()
    ))
    .unwrap();
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    (tmp, SqliteGraphStore::new(pool))
}

fn class(id: &str) -> Node {
    Node::new(
        id,
        NodeKind::Class(ClassNode {
            file_id: "f".into(),
            name: id.to_uppercase(),
            class_type: "class".into(),
            description: String::new(),
            modifiers: vec!["pub".into()],
        }),
    )
}

fn topic(id: &str, name: &str) -> Node {
    Node::new(
        id,
        NodeKind::Topic(TopicNode {
            name: name.into(),
            description: String::new(),
            level: 0,
        }),
    )
}

async fn chain(store: &SqliteGraphStore, ids: &[&str]) {
    for id in ids {
        store.create_node(class(id)).await.unwrap();
    }
    for pair in ids.windows(2) {
        store
            .create_relationship(CodeRelation::Inherits.into(), pair[0], pair[1], Metadata::new())
            .await
            .unwrap();
    }
}

fn ids(nodes: &[Node]) -> Vec<&str> {
    nodes.iter().map(|n| n.id.as_str()).collect()
}

#[tokio::test]
async fn test_node_roundtrip_keeps_attributes() {
    let (_tmp, store) = open_store().await;
    let mut node = class("a");
    node.additional_attributes.insert("origin".into(), "parser".into());

    let created = store.create_node(node).await.unwrap();
    assert!(created.created_at.is_some());
    assert!(created.updated_at.is_none());

    let loaded = store.get_node("a").await.unwrap().unwrap();
    assert_eq!(loaded.kind, created.kind);
    assert_eq!(loaded.additional_attributes["origin"], "parser");
    assert_eq!(loaded.created_at, created.created_at);

    assert!(store.get_node("missing").await.unwrap().is_none());
    let err = store.create_node(class("a")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_update_replaces_and_keeps_created_at() {
    let (_tmp, store) = open_store().await;
    let created = store.create_node(topic("t", "Old")).await.unwrap();
    let updated = store.update_node(topic("t", "New")).await.unwrap();
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at.is_some());

    let loaded = store.get_node("t").await.unwrap().unwrap();
    match loaded.kind {
        NodeKind::Topic(t) => assert_eq!(t.name, "New"),
        other => panic!("unexpected kind {other:?}"),
    }

    let err = store.update_node(class("t")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let err = store.update_node(topic("missing", "x")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_relationship_requires_endpoints() {
    let (_tmp, store) = open_store().await;
    store.create_node(class("a")).await.unwrap();
    let err = store
        .create_relationship(CodeRelation::Calls.into(), "a", "ghost", Metadata::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_relationship_lookup_and_delete() {
    let (_tmp, store) = open_store().await;
    chain(&store, &["a", "b"]).await;

    let rels = store.relationships_between("a", "b").await.unwrap();
    assert_eq!(rels.len(), 1);
    assert!(store.relationships_between("b", "a").await.unwrap().is_empty());

    let rel = store.get_relationship(&rels[0].id).await.unwrap().unwrap();
    assert_eq!(rel.rel_type, RelationType::from(CodeRelation::Inherits));
    assert_eq!(store.outgoing("a", Some(CodeRelation::Inherits.into())).await.unwrap().len(), 1);
    assert!(store.outgoing("a", Some(CodeRelation::Calls.into())).await.unwrap().is_empty());
    assert_eq!(store.incoming("b", None).await.unwrap().len(), 1);

    store.delete_relationship(&rel.id).await.unwrap();
    let err = store.delete_relationship(&rel.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_detach_delete_removes_incident_relationships() {
    let (_tmp, store) = open_store().await;
    chain(&store, &["a", "b", "c"]).await;

    let before = store.get_dependencies("a", 1, 3).await.unwrap();
    assert_eq!(ids(&before), vec!["b", "c"]);

    store.delete_node("b").await.unwrap();
    assert!(store.outgoing("a", None).await.unwrap().is_empty());
    assert!(store.incoming("c", None).await.unwrap().is_empty());
    assert!(store.get_dependencies("a", 1, 3).await.unwrap().is_empty());
    assert_eq!(store.delete_node("b").await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_depth_bounds_and_start_exclusion() {
    let (_tmp, store) = open_store().await;
    chain(&store, &["a", "b", "c", "d"]).await;
    store
        .create_relationship(CodeRelation::Inherits.into(), "d", "a", Metadata::new())
        .await
        .unwrap();

    assert_eq!(ids(&store.get_dependencies("a", 2, 3).await.unwrap()), vec!["c", "d"]);
    assert_eq!(ids(&store.get_dependencies("a", 1, 1).await.unwrap()), vec!["b"]);
    // the cycle reaches "a" again at depth 4
    assert_eq!(ids(&store.get_dependencies("a", 1, 5).await.unwrap()), vec!["b", "c", "d"]);
    assert_eq!(ids(&store.get_dependencies("a", 0, 1).await.unwrap()), vec!["a", "b"]);
}

#[tokio::test]
async fn test_paths_never_reuse_a_relationship() {
    let (_tmp, store) = open_store().await;
    chain(&store, &["a", "b"]).await;
    store
        .create_relationship(CodeRelation::Inherits.into(), "b", "a", Metadata::new())
        .await
        .unwrap();

    // a -> b -> a -> b would need the a -> b edge twice
    assert!(store.get_dependencies("a", 3, 3).await.unwrap().is_empty());
    assert_eq!(ids(&store.get_dependencies("a", 1, 3).await.unwrap()), vec!["b"]);

    let back_and_forth = Traversal::new("a", vec![CodeRelation::Inherits.into()])
        .direction(Direction::Both)
        .depth(3, 3);
    assert!(store.traverse(&back_and_forth).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_diamond_reaches_shared_node_once() {
    let (_tmp, store) = open_store().await;
    chain(&store, &["a", "b", "d"]).await;
    store.create_node(class("c")).await.unwrap();
    for (from, to) in [("a", "c"), ("c", "d")] {
        store
            .create_relationship(CodeRelation::Inherits.into(), from, to, Metadata::new())
            .await
            .unwrap();
    }
    assert_eq!(ids(&store.get_dependencies("a", 2, 2).await.unwrap()), vec!["d"]);
    assert_eq!(ids(&store.get_dependencies("a", 1, 2).await.unwrap()), vec!["b", "c", "d"]);
}

#[tokio::test]
async fn test_traversal_validation_and_missing_start() {
    let (_tmp, store) = open_store().await;
    chain(&store, &["a", "b"]).await;

    let too_deep = Traversal::new("a", vec![CodeRelation::Inherits.into()]).depth(1, 11);
    assert_eq!(store.traverse(&too_deep).await.unwrap_err().kind(), ErrorKind::InvalidInput);

    let inverted = Traversal::new("a", vec![CodeRelation::Inherits.into()]).depth(3, 1);
    assert_eq!(store.traverse(&inverted).await.unwrap_err().kind(), ErrorKind::InvalidInput);

    let err = store.get_dependencies("nope", 1, 2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_incoming_traversal_and_target_label() {
    let (_tmp, store) = open_store().await;
    chain(&store, &["a", "b"]).await;
    store.create_node(topic("t", "Design")).await.unwrap();
    store
        .create_relationship(CodeRelation::Inherits.into(), "t", "b", Metadata::new())
        .await
        .unwrap();

    let incoming = Traversal::new("b", vec![CodeRelation::Inherits.into()]).direction(Direction::Incoming);
    assert_eq!(ids(&store.traverse(&incoming).await.unwrap()), vec!["a", "t"]);

    let classes_only = incoming.target("Class");
    assert_eq!(ids(&store.traverse(&classes_only).await.unwrap()), vec!["a"]);
}

#[tokio::test]
async fn test_related_follows_both_directions() {
    let (_tmp, store) = open_store().await;
    for id in ["a", "b", "c"] {
        store.create_node(topic(id, id)).await.unwrap();
    }
    store
        .create_relationship(KnowledgeRelation::References.into(), "b", "a", Metadata::new())
        .await
        .unwrap();
    store
        .create_relationship(KnowledgeRelation::RelatedTo.into(), "b", "c", Metadata::new())
        .await
        .unwrap();

    assert_eq!(ids(&store.get_related("a", 1).await.unwrap()), vec!["b"]);
    assert_eq!(ids(&store.get_related("a", 2).await.unwrap()), vec!["b", "c"]);
}

#[tokio::test]
async fn test_merge_is_idempotent_and_undirected_for_similarity() {
    let (_tmp, store) = open_store().await;
    store.create_node(topic("a", "a")).await.unwrap();
    store.create_node(topic("b", "b")).await.unwrap();

    let mut props = Metadata::new();
    props.insert("score".into(), 0.8.into());
    let first = store
        .merge_relationship(DocumentRelation::SimilarTo.into(), "a", "b", props.clone())
        .await
        .unwrap();
    props.insert("score".into(), 0.9.into());
    let second = store
        .merge_relationship(DocumentRelation::SimilarTo.into(), "b", "a", props)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.properties["score"], 0.9);
    assert_eq!(store.outgoing("a", None).await.unwrap().len(), 1);
    assert!(store.outgoing("b", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_and_find() {
    let (_tmp, store) = open_store().await;
    store.create_node(topic("t1", "Borrow Checker")).await.unwrap();
    store.create_node(topic("t2", "Lifetimes")).await.unwrap();

    let hits = store.search_nodes("Topic", &["name"], "borrow", 10).await.unwrap();
    assert_eq!(ids(&hits), vec!["t1"]);
    assert_eq!(store.search_nodes("Topic", &["name"], "", 10).await.unwrap().len(), 2);
    let found = store
        .find_nodes("Topic", "name", &serde_json::json!("Lifetimes"))
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["t2"]);
    let by_level = store
        .find_nodes("Topic", "level", &serde_json::json!(0))
        .await
        .unwrap();
    assert_eq!(by_level.len(), 2);

    assert_eq!(store.list_nodes("Topic", 0, 10).await.unwrap().len(), 2);
    assert_eq!(store.list_nodes("Topic", 1, 10).await.unwrap().len(), 1);
    assert!(store.list_nodes("Class", 0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_code_graph_call_chain() {
    let (_tmp, store) = open_store().await;
    let graph = CodeGraph::new(Arc::new(store.clone()));

    graph
        .create_code_file(Typed::new(
            "file",
            CodeFileNode {
                project_id: "p1".into(),
                file_path: "src/lib.rs".into(),
                language: "rust".into(),
                description: String::new(),
            },
        ))
        .await
        .unwrap();

    for name in ["main", "parse", "lex"] {
        graph
            .create_function(Typed::new(
                name,
                FunctionNode {
                    file_id: "file".into(),
                    class_id: None,
                    name: name.into(),
                    parameters: vec![],
                    return_type: "()".into(),
                    description: String::new(),
                    complexity: 1,
                },
            ))
            .await
            .unwrap();
    }
    graph.add_call("main", "parse").await.unwrap();
    graph.add_call("parse", "lex").await.unwrap();

    let direct: Vec<String> = graph.call_graph("main", 1).await.unwrap().into_iter().map(|f| f.id).collect();
    assert_eq!(direct, vec!["parse"]);
    let all: Vec<String> = graph.call_graph("main", 3).await.unwrap().into_iter().map(|f| f.id).collect();
    assert_eq!(all, vec!["parse", "lex"]);

    let files = graph.list_files_by_project("p1").await.unwrap();
    assert_eq!(files.len(), 1);
    // every function hangs off its file
    assert_eq!(store.outgoing("file", Some(CodeRelation::ContainsFunction.into())).await.unwrap().len(), 3);
}
