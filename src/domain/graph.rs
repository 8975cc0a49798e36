//! Knowledge-Graph Domain Models
//!
//! Entity, relationship, and community structures, plus the transient
//! extraction records produced per text unit and consumed by the graph
//! builder.

use serde::{Deserialize, Serialize};

// =============================================================================
// Entity Types
// =============================================================================

/// Types of entities that can be extracted from documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A person or individual
    Person,
    /// An organization, company, or institution
    Organization,
    /// A geographical or political location
    Location,
    /// An event or occurrence
    Event,
    /// A technical or abstract concept
    Concept,
    /// A product, technology, or artifact
    Product,
    /// Date or time reference
    Temporal,
    /// Numeric or quantitative data
    Quantity,
    /// Custom entity type
    Custom(String),
}

impl Default for EntityType {
    fn default() -> Self {
        Self::Concept
    }
}

impl EntityType {
    /// Map a free-form type label (as produced by extractors) onto a type tag.
    pub fn parse_label(label: &str) -> Self {
        match label.to_uppercase().as_str() {
            "PERSON" | "PER" => Self::Person,
            "ORG" | "ORGANIZATION" => Self::Organization,
            "GPE" | "LOC" | "LOCATION" => Self::Location,
            "EVENT" => Self::Event,
            "PRODUCT" | "WORK_OF_ART" | "TECHNOLOGY" => Self::Product,
            "DATE" | "TIME" | "YEAR" => Self::Temporal,
            "MONEY" | "PERCENT" | "QUANTITY" | "CARDINAL" | "ORDINAL" => Self::Quantity,
            "CONCEPT" => Self::Concept,
            other => {
                if other.is_empty() {
                    Self::Concept
                } else {
                    Self::Custom(label.to_string())
                }
            }
        }
    }
}

// =============================================================================
// Transient Extraction Records
// =============================================================================

/// An entity candidate produced by an extractor for a single text unit.
/// Consumed by the graph builder and then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub title: String,
    pub entity_type: EntityType,
    pub description: String,
    /// Extractor confidence, used as the initial merge weight.
    pub weight: f32,
}

/// A relationship candidate between two entity titles. Endpoints are
/// resolved against the graph during the merge pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    pub source_title: String,
    pub target_title: String,
    pub relationship_type: String,
    pub description: String,
    pub weight: f32,
}

/// Result of running extraction over one text unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

// =============================================================================
// Entity
// =============================================================================

/// Canonical identity of an entity within a session: normalized title plus
/// type tag. Exactly one [`Entity`] exists per distinct key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub title: String,
    pub entity_type: EntityType,
}

impl EntityKey {
    /// Build the key for a raw extracted title: lower-cased and trimmed.
    pub fn new(title: &str, entity_type: EntityType) -> Self {
        Self {
            title: normalize_title(title),
            entity_type,
        }
    }
}

/// Lower-case and trim a raw entity title.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// A deduplicated, evidence-accumulating node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Session-scoped numeric identifier.
    pub id: u64,
    /// Display title (first-seen casing).
    pub title: String,
    /// Entity type classification.
    pub entity_type: EntityType,
    /// Merged description: evidence accumulated across extractions, bounded
    /// in total length with the oldest evidence truncated first.
    pub description: String,
    /// How many extractions resolved to this entity.
    pub occurrence_count: u64,
    /// Mean of the contributing description embeddings.
    pub embedding: Vec<f32>,
    /// Number of non-empty embeddings folded into the mean.
    pub embedding_samples: u32,
    /// Ids of the text units this entity was extracted from.
    pub source_text_unit_ids: Vec<u64>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

// =============================================================================
// Relationship
// =============================================================================

/// Storage key for a relationship. Endpoint ids are held in ascending order
/// so a reverse mention merges into the same edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub source_id: u64,
    pub target_id: u64,
    pub relationship_type: String,
}

impl RelationshipKey {
    /// Build an ordered key. Returns `None` for self-loops.
    pub fn ordered(a: u64, b: u64, relationship_type: &str) -> Option<Self> {
        if a == b {
            return None;
        }
        let (source_id, target_id) = if a <= b { (a, b) } else { (b, a) };
        Some(Self {
            source_id,
            target_id,
            relationship_type: relationship_type.trim().to_lowercase().replace(' ', "_"),
        })
    }
}

/// A deduplicated, weight-accumulating edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: u64,
    pub source_id: u64,
    pub target_id: u64,
    pub relationship_type: String,
    /// Merged description evidence, bounded like entity descriptions.
    pub description: String,
    /// Additive weight, capped at the session's configured ceiling.
    pub weight: f32,
    /// How many extractions resolved to this edge.
    pub occurrence_count: u64,
    pub created_at: String,
}

// =============================================================================
// Community
// =============================================================================

/// A cluster of related entities detected via graph partitioning.
///
/// Ids are stable only within one detection pass; a re-detection replaces
/// all communities and renumbers from zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: u64,
    /// Ids of entities in this community.
    pub entity_ids: Vec<u64>,
    /// Ids of relationships with both endpoints inside the community.
    pub relationship_ids: Vec<u64>,
    /// Terse synthesis of the member entities' descriptions.
    pub summary: String,
    /// Embedding of the summary, used for community-facet scoring.
    pub embedding: Vec<f32>,
    /// Number of member entities.
    pub size: usize,
}

// =============================================================================
// Tests
// =============================================================================
