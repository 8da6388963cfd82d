//! Core record and input type definitions.
//!
//! Defines the three stored records ([`Entity`], [`Relation`], [`Memory`]),
//! their enumerations, the creation inputs, the [`EntityPatch`] update type,
//! and the generic wrappers returned by reads ([`Scored`], [`Page`]).

use serde::{Deserialize, Deserializer, Serialize};

pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Kind of knowledge-graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Concept,
    Event,
    /// Anything the fixed kinds do not cover; the name carries the meaning.
    Custom,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        Self::Person,
        Self::Organization,
        Self::Location,
        Self::Concept,
        Self::Event,
        Self::Custom,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Concept => "concept",
            Self::Event => "event",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(Self::Person),
            "organization" => Ok(Self::Organization),
            "location" => Ok(Self::Location),
            "concept" => Ok(Self::Concept),
            "event" => Ok(Self::Event),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("unknown entity type: {s}")),
        }
    }
}

/// Where a memory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    #[default]
    Conversation,
    Document,
    Extraction,
}

impl MemorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Document => "document",
            Self::Extraction => "extraction",
        }
    }
}

impl std::fmt::Display for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemorySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversation" => Ok(Self::Conversation),
            "document" => Ok(Self::Document),
            "extraction" => Ok(Self::Extraction),
            _ => Err(format!("unknown memory source: {s}")),
        }
    }
}

/// Which edges a traversal follows from a frontier node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Edges where the node is the source.
    Outgoing,
    /// Edges where the node is the target.
    Incoming,
    /// Either; edges are treated as undirected for expansion only.
    #[default]
    Both,
}

impl Direction {
    pub fn follows_outgoing(&self) -> bool {
        matches!(self, Self::Outgoing | Self::Both)
    }

    pub fn follows_incoming(&self) -> bool {
        matches!(self, Self::Incoming | Self::Both)
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outgoing" => Ok(Self::Outgoing),
            "incoming" => Ok(Self::Incoming),
            "both" => Ok(Self::Both),
            _ => Err(format!("unknown direction: {s}")),
        }
    }
}

/// A typed, named node in an owner's knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// UUID v7 primary key.
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub properties: Properties,
    pub owner_id: String,
    /// Free-form provenance, e.g. a document id or `"extraction"`.
    pub source: Option<String>,
    /// In `[0.0, 1.0]`; merges keep the maximum.
    pub confidence: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// A typed, directed edge between two entities of the same owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    /// Relationship label (e.g. `"works_at"`), 1–64 characters.
    #[serde(rename = "type")]
    pub relation_type: String,
    pub properties: Properties,
    pub owner_id: String,
    pub confidence: f64,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub created_at: String,
}

/// A free-text record with an embedding. The vector itself stays in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub owner_id: String,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub source: MemorySource,
    pub importance: f64,
    /// Display order is insertion order; matching ignores order.
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for entity creation (upsert on `(owner_id, entity_type, name)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    pub owner_id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl NewEntity {
    pub fn new(owner_id: impl Into<String>, entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            entity_type,
            name: name.into(),
            properties: Properties::new(),
            source: None,
            confidence: default_confidence(),
        }
    }

    /// Text that represents this entity in vector space.
    pub fn embedding_text(&self) -> String {
        entity_embedding_text(self.entity_type, &self.name)
    }
}

pub fn entity_embedding_text(entity_type: EntityType, name: &str) -> String {
    format!("{entity_type}: {name}")
}

/// Input for relation creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelation {
    pub owner_id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub valid_from: Option<String>,
    #[serde(default)]
    pub valid_to: Option<String>,
}

impl NewRelation {
    pub fn new(
        owner_id: impl Into<String>,
        source_id: impl Into<String>,
        relation_type: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type: relation_type.into(),
            properties: Properties::new(),
            confidence: default_confidence(),
            valid_from: None,
            valid_to: None,
        }
    }
}

/// Input for memory creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemory {
    pub owner_id: String,
    pub content: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub source: MemorySource,
    #[serde(default = "default_importance")]
    pub importance: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewMemory {
    pub fn new(owner_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            content: content.into(),
            agent_id: None,
            session_id: None,
            source: MemorySource::default(),
            importance: default_importance(),
            tags: Vec::new(),
        }
    }
}

fn default_confidence() -> f64 {
    1.0
}

fn default_importance() -> f64 {
    0.5
}

/// One field of a partial update.
///
/// Deserializes so that a missing key is `Unchanged` (with `#[serde(default)]`),
/// an explicit `null` is `Clear`, and any other value is `Set`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPatch<T> {
    Unchanged,
    Clear,
    Set(T),
}

impl<T> Default for FieldPatch<T> {
    fn default() -> Self {
        Self::Unchanged
    }
}

impl<T> FieldPatch<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Self::Set(v) => Some(v),
            _ => None,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldPatch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => FieldPatch::Set(value),
            None => FieldPatch::Clear,
        })
    }
}

/// Partial entity update. Unchanged fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityPatch {
    #[serde(default)]
    pub name: FieldPatch<String>,
    #[serde(default, rename = "type")]
    pub entity_type: FieldPatch<EntityType>,
    /// `Set` replaces the whole object; `Clear` resets it to `{}`.
    #[serde(default)]
    pub properties: FieldPatch<Properties>,
    #[serde(default)]
    pub source: FieldPatch<String>,
    #[serde(default)]
    pub confidence: FieldPatch<f64>,
}

impl EntityPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_unchanged()
            && self.entity_type.is_unchanged()
            && self.properties.is_unchanged()
            && self.source.is_unchanged()
            && self.confidence.is_unchanged()
    }

    /// Whether the change moves the entity in vector space.
    pub fn changes_identity(&self) -> bool {
        !self.name.is_unchanged() || !self.entity_type.is_unchanged()
    }
}

/// A record paired with its similarity to a query.
#[derive(Debug, Clone, Serialize)]
pub struct Scored<T> {
    #[serde(flatten)]
    pub item: T,
    /// `1 - cosine_distance`; not clamped.
    pub score: f64,
}

/// Offset pagination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 1000;

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// One page of an owner-scoped listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total rows matching the filter, ignoring pagination.
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

/// Result of an entity create: the stored row and whether it merged into an existing one.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertedEntity {
    #[serde(flatten)]
    pub entity: Entity,
    pub merged: bool,
}

/// One item of a batch operation that failed while the rest went ahead.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    /// What the item was, e.g. `"memory"`, `"entity"`, `"relation"`.
    pub kind: &'static str,
    /// Position of the item in its input list.
    pub index: usize,
    pub code: crate::error::ErrorCode,
    pub message: String,
}

impl ItemFailure {
    pub fn new(kind: &'static str, index: usize, err: &crate::error::MemoryError) -> Self {
        Self {
            kind,
            index,
            code: err.code,
            message: err.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_round_trips_through_str() {
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
        assert!("planet".parse::<EntityType>().is_err());
    }

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let patch: EntityPatch =
            serde_json::from_str(r#"{"source": null, "confidence": 0.4}"#).unwrap();
        assert_eq!(patch.name, FieldPatch::Unchanged);
        assert_eq!(patch.source, FieldPatch::Clear);
        assert_eq!(patch.confidence, FieldPatch::Set(0.4));
        assert!(!patch.is_empty());
        assert!(!patch.changes_identity());
    }

    #[test]
    fn empty_object_is_empty_patch() {
        let patch: EntityPatch = serde_json::from_str("{}").unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn renaming_changes_identity() {
        let patch: EntityPatch = serde_json::from_str(r#"{"name": "Acme Inc"}"#).unwrap();
        assert!(patch.changes_identity());
        assert_eq!(patch.name.as_set().map(String::as_str), Some("Acme Inc"));
    }

    #[test]
    fn new_memory_defaults() {
        let input: NewMemory =
            serde_json::from_str(r#"{"owner_id": "u1", "content": "hello"}"#).unwrap();
        assert_eq!(input.importance, 0.5);
        assert_eq!(input.source, MemorySource::Conversation);
        assert!(input.tags.is_empty());
    }

    #[test]
    fn scored_flattens_item() {
        let scored = Scored {
            item: Memory {
                id: "m1".into(),
                content: "x".into(),
                owner_id: "u1".into(),
                agent_id: None,
                session_id: None,
                source: MemorySource::Document,
                importance: 0.5,
                tags: vec!["a".into()],
                created_at: "t".into(),
                updated_at: "t".into(),
            },
            score: 0.9,
        };
        let json = serde_json::to_value(&scored).unwrap();
        assert_eq!(json["id"], "m1");
        assert_eq!(json["score"], 0.9);
        assert_eq!(json["source"], "document");
    }
}
