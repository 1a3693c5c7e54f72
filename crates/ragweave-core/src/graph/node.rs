//! Typed graph nodes.
//!
//! Every node type has a fixed attribute schema. A [`Node`] carries one
//! [`NodeKind`] variant plus an open `additional_attributes` map for
//! fields outside the schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::models::Metadata;

/// The schema a node type or relationship type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Document,
    Knowledge,
    Novel,
    Code,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Document => "document",
            Domain::Knowledge => "knowledge",
            Domain::Novel => "novel",
            Domain::Code => "code",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "document" => Ok(Domain::Document),
            "knowledge" => Ok(Domain::Knowledge),
            "novel" => Ok(Domain::Novel),
            "code" => Ok(Domain::Code),
            other => Err(Error::InvalidInput(format!("unknown graph domain '{other}'"))),
        }
    }
}

// ============ Document projection ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub doc_name: String,
    pub doc_hash: String,
    pub file_path: String,
    pub file_type: String,
    pub ctime: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub entity_type: String,
    pub entity_name: String,
    pub entity_value: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub ctime: DateTime<Utc>,
}

// ============ Knowledge base ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocumentNode {
    pub title: String,
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicNode {
    pub name: String,
    pub description: String,
    /// Depth in the topic hierarchy; roots are level 0.
    pub level: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    pub name: String,
    pub definition: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntityNode {
    pub name: String,
    /// person, organization, event, ...
    pub entity_type: String,
    pub description: String,
    #[serde(default)]
    pub attributes: Metadata,
}

// ============ Novel world ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NovelNode {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSettingNode {
    pub novel_id: String,
    pub name: String,
    /// magic_system, technology, culture, ...
    pub setting_type: String,
    pub description: String,
    #[serde(default)]
    pub rules: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationNode {
    pub novel_id: String,
    pub name: String,
    pub location_type: String,
    pub description: String,
    #[serde(default)]
    pub coordinates: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterNode {
    pub novel_id: String,
    pub name: String,
    pub age: i64,
    pub gender: String,
    /// protagonist, antagonist, supporting, ...
    pub role: String,
    pub personality: String,
    pub backstory: String,
    #[serde(default)]
    pub attributes: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactionNode {
    pub novel_id: String,
    pub name: String,
    pub faction_type: String,
    pub description: String,
    pub power: i64,
}

// ============ Code ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeFileNode {
    pub project_id: String,
    pub file_path: String,
    pub language: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassNode {
    pub file_id: String,
    pub name: String,
    /// class, struct, interface, trait, ...
    pub class_type: String,
    pub description: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub file_id: String,
    /// Set for methods.
    #[serde(default)]
    pub class_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub return_type: String,
    pub description: String,
    pub complexity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageNode {
    pub name: String,
    pub version: String,
    pub description: String,
    pub repository: String,
}

/// Implemented by every attribute struct; ties it to its label and domain.
pub trait NodeSchema: Clone + Send + Sync + Sized + 'static {
    const LABEL: &'static str;
    const DOMAIN: Domain;

    fn into_kind(self) -> NodeKind;
    fn from_kind(kind: NodeKind) -> Option<Self>;
}

macro_rules! node_kinds {
    ($($variant:ident($ty:ident) => $domain:ident),+ $(,)?) => {
        /// Node attributes, tagged by label.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "label", content = "attributes")]
        pub enum NodeKind {
            $($variant($ty),)+
        }

        impl NodeKind {
            /// Every label, in declaration order.
            pub const LABELS: &'static [&'static str] = &[$(stringify!($variant)),+];

            pub fn label(&self) -> &'static str {
                match self {
                    $(NodeKind::$variant(_) => stringify!($variant),)+
                }
            }

            pub fn domain(&self) -> Domain {
                match self {
                    $(NodeKind::$variant(_) => Domain::$domain,)+
                }
            }
        }

        $(
            impl NodeSchema for $ty {
                const LABEL: &'static str = stringify!($variant);
                const DOMAIN: Domain = Domain::$domain;

                fn into_kind(self) -> NodeKind {
                    NodeKind::$variant(self)
                }

                fn from_kind(kind: NodeKind) -> Option<Self> {
                    match kind {
                        NodeKind::$variant(attrs) => Some(attrs),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )+
    };
}

node_kinds! {
    Document(DocumentNode) => Document,
    Entity(EntityNode) => Document,
    KnowledgeDocument(KnowledgeDocumentNode) => Knowledge,
    Topic(TopicNode) => Knowledge,
    Concept(ConceptNode) => Knowledge,
    KnowledgeEntity(KnowledgeEntityNode) => Knowledge,
    Novel(NovelNode) => Novel,
    WorldSetting(WorldSettingNode) => Novel,
    Location(LocationNode) => Novel,
    Character(CharacterNode) => Novel,
    Faction(FactionNode) => Novel,
    CodeFile(CodeFileNode) => Code,
    Class(ClassNode) => Code,
    Function(FunctionNode) => Code,
    Package(PackageNode) => Code,
}

impl NodeKind {
    /// Split into the label and the attribute object, the stored form.
    pub fn to_parts(&self) -> Result<(&'static str, serde_json::Value)> {
        let mut value = serde_json::to_value(self)?;
        let attrs = value
            .get_mut("attributes")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null);
        Ok((self.label(), attrs))
    }

    /// Inverse of [`NodeKind::to_parts`].
    pub fn from_parts(label: &str, attributes: serde_json::Value) -> Result<Self> {
        if !Self::LABELS.contains(&label) {
            return Err(Error::InvalidInput(format!("unknown node label '{label}'")));
        }
        serde_json::from_value(serde_json::json!({
            "label": label,
            "attributes": attributes,
        }))
        .map_err(|e| Error::InvalidInput(format!("attributes for {label}: {e}")))
    }

    /// A top-level string attribute, used by attribute lookups and search.
    pub fn attribute(&self, key: &str) -> Option<serde_json::Value> {
        self.to_parts()
            .ok()
            .and_then(|(_, attrs)| attrs.get(key).cloned())
    }
}

/// A stored graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default)]
    pub additional_attributes: Metadata,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            additional_attributes: Metadata::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }
}

/// A node whose attributes are known to be of type `T`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Typed<T> {
    pub id: String,
    pub attrs: T,
    pub additional_attributes: Metadata,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T: NodeSchema> Typed<T> {
    pub fn new(id: impl Into<String>, attrs: T) -> Self {
        Self {
            id: id.into(),
            attrs,
            additional_attributes: Metadata::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn into_node(self) -> Node {
        Node {
            id: self.id,
            kind: self.attrs.into_kind(),
            additional_attributes: self.additional_attributes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Fails with `InvalidInput` when the node has another label.
    pub fn from_node(node: Node) -> Result<Self> {
        let label = node.label();
        let attrs = T::from_kind(node.kind).ok_or_else(|| {
            Error::InvalidInput(format!("node {} is a {label}, not a {}", node.id, T::LABEL))
        })?;
        Ok(Self {
            id: node.id,
            attrs,
            additional_attributes: node.additional_attributes,
            created_at: node.created_at,
            updated_at: node.updated_at,
        })
    }
}
