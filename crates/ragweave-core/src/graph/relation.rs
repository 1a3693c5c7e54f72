//! Relationship vocabulary and the single relationship record.
//!
//! Each domain has a closed set of relationship names. [`RelationType`]
//! unifies them so one store interface handles all four schemas. Its
//! string form is `domain:NAME`, e.g. `code:INHERITS`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::node::Domain;
use crate::error::{Error, Result};
use crate::models::Metadata;

macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

vocabulary! {
    /// Relationships between novel-world nodes.
    NovelRelation {
        HasWorldSetting => "HAS_WORLD_SETTING",
        HasLocation => "HAS_LOCATION",
        HasCharacter => "HAS_CHARACTER",
        HasFaction => "HAS_FACTION",
        LocatedIn => "LOCATED_IN",
        Knows => "KNOWS",
        EnemyOf => "ENEMY_OF",
        MemberOf => "MEMBER_OF",
        Contains => "CONTAINS",
        Controls => "CONTROLS",
    }
}

vocabulary! {
    /// Relationships between code nodes.
    CodeRelation {
        ContainsClass => "CONTAINS_CLASS",
        ContainsFunction => "CONTAINS_FUNCTION",
        Inherits => "INHERITS",
        Implements => "IMPLEMENTS",
        Calls => "CALLS",
        Imports => "IMPORTS",
        DependsOn => "DEPENDS_ON",
    }
}

vocabulary! {
    /// Relationships between knowledge-base nodes.
    KnowledgeRelation {
        Covers => "COVERS",
        References => "REFERENCES",
        Contains => "CONTAINS",
        RelatedTo => "RELATED_TO",
        BelongsTo => "BELONGS_TO",
        DerivedFrom => "DERIVED_FROM",
        MentionedIn => "MENTIONED_IN",
    }
}

vocabulary! {
    /// Relationships in the document/entity projection.
    DocumentRelation {
        Contains => "CONTAINS",
        References => "REFERENCES",
        SimilarTo => "SIMILAR_TO",
        MentionedIn => "MENTIONED_IN",
        RelatedTo => "RELATED_TO",
        DerivedFrom => "DERIVED_FROM",
        PartOf => "PART_OF",
    }
}

/// Any relationship type of any domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RelationType {
    Novel(NovelRelation),
    Code(CodeRelation),
    Knowledge(KnowledgeRelation),
    Document(DocumentRelation),
}

impl RelationType {
    pub fn domain(&self) -> Domain {
        match self {
            RelationType::Novel(_) => Domain::Novel,
            RelationType::Code(_) => Domain::Code,
            RelationType::Knowledge(_) => Domain::Knowledge,
            RelationType::Document(_) => Domain::Document,
        }
    }

    /// The bare relationship name, e.g. `CONTAINS`.
    pub fn name(&self) -> &'static str {
        match self {
            RelationType::Novel(r) => r.as_str(),
            RelationType::Code(r) => r.as_str(),
            RelationType::Knowledge(r) => r.as_str(),
            RelationType::Document(r) => r.as_str(),
        }
    }

    /// Undirected relationships match in either direction.
    pub fn is_undirected(&self) -> bool {
        matches!(self, RelationType::Document(DocumentRelation::SimilarTo))
    }
}

impl From<NovelRelation> for RelationType {
    fn from(r: NovelRelation) -> Self {
        RelationType::Novel(r)
    }
}

impl From<CodeRelation> for RelationType {
    fn from(r: CodeRelation) -> Self {
        RelationType::Code(r)
    }
}

impl From<KnowledgeRelation> for RelationType {
    fn from(r: KnowledgeRelation) -> Self {
        RelationType::Knowledge(r)
    }
}

impl From<DocumentRelation> for RelationType {
    fn from(r: DocumentRelation) -> Self {
        RelationType::Document(r)
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain(), self.name())
    }
}

impl FromStr for RelationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("unknown relationship type '{s}'"));
        let (domain, name) = s.split_once(':').ok_or_else(invalid)?;
        let parsed = match domain.parse::<Domain>().map_err(|_| invalid())? {
            Domain::Novel => NovelRelation::parse(name).map(RelationType::Novel),
            Domain::Code => CodeRelation::parse(name).map(RelationType::Code),
            Domain::Knowledge => KnowledgeRelation::parse(name).map(RelationType::Knowledge),
            Domain::Document => DocumentRelation::parse(name).map(RelationType::Document),
        };
        parsed.ok_or_else(invalid)
    }
}

impl From<RelationType> for String {
    fn from(r: RelationType) -> String {
        r.to_string()
    }
}

impl TryFrom<String> for RelationType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// A stored relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub rel_type: RelationType,
    pub from_id: String,
    pub to_id: String,
    #[serde(default)]
    pub properties: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// The endpoint opposite `node_id`.
    pub fn other_end(&self, node_id: &str) -> &str {
        if self.from_id == node_id {
            &self.to_id
        } else {
            &self.from_id
        }
    }

    /// Whether this relationship has type `rel_type` and joins `from` to
    /// `to`, ignoring direction for undirected types.
    pub fn joins(&self, rel_type: RelationType, from: &str, to: &str) -> bool {
        if self.rel_type != rel_type {
            return false;
        }
        (self.from_id == from && self.to_id == to)
            || (rel_type.is_undirected() && self.from_id == to && self.to_id == from)
    }
}
