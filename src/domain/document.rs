//! Documents, Text Units, and Engine Result Types

use serde::{Deserialize, Serialize};

use super::graph::{Community, Entity};

// =============================================================================
// Document and TextUnit
// =============================================================================

/// A document submitted for indexing: raw text plus an optional source
/// identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    /// Caller-supplied source identifier (filename, URL, ...).
    #[serde(default)]
    pub source: Option<String>,
    pub text: String,
}

impl DocumentInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            source: None,
            text: text.into(),
        }
    }

    pub fn with_source(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            text: text.into(),
        }
    }
}

impl From<&str> for DocumentInput {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for DocumentInput {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// A raw document record as stored. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Session-scoped numeric identifier.
    pub id: u64,
    /// Caller-supplied source identifier (filename, URL, ...).
    pub source: String,
    /// Length of the raw text in characters.
    pub length: usize,
    pub created_at: String,
}

/// A bounded, possibly overlapping slice of a document: the atomic unit of
/// extraction and embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: u64,
    pub document_id: u64,
    /// Position of this unit within its document.
    pub sequence: usize,
    pub content: String,
    /// Lazily computed; empty until the indexing pipeline fills it.
    pub embedding: Vec<f32>,
    /// Ids of entities extracted from this unit.
    pub entity_ids: Vec<u64>,
}

// =============================================================================
// Indexing Statistics
// =============================================================================

/// Cumulative per-session indexing counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents_indexed: u64,
    pub text_units_created: u64,
    pub entities_extracted: u64,
    pub relationships_extracted: u64,
    /// Relationships dropped because an endpoint could not be resolved or
    /// the edge was a self-loop.
    pub relationships_rejected: u64,
    /// Text units skipped because a capability call failed or timed out.
    pub units_failed: u64,
    pub communities_detected: u64,
    /// Cumulative wall-clock indexing time in seconds.
    pub indexing_time_seconds: f64,
}

// =============================================================================
// Query Types
// =============================================================================

/// Parameters for a query against a session's graph and index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    /// Maximum results per facet.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_true")]
    pub include_entities: bool,
    #[serde(default = "default_true")]
    pub include_text_units: bool,
    #[serde(default = "default_true")]
    pub include_communities: bool,
}

fn default_top_k() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl QueryRequest {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            include_entities: true,
            include_text_units: true,
            include_communities: true,
        }
    }

    /// Whether every facet is disabled, making the query a cheap no-op.
    pub fn is_noop(&self) -> bool {
        !self.include_entities && !self.include_text_units && !self.include_communities
    }
}

/// An entity with its similarity score against the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntity {
    pub entity: Entity,
    pub score: f32,
}

/// A text unit with its similarity score against the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredTextUnit {
    pub text_unit: TextUnit,
    pub score: f32,
}

/// A community with its summary-similarity score against the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCommunity {
    pub community: Community,
    pub score: f32,
}

/// Ranked, scored results for each requested facet. Transient, not persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub entities: Vec<ScoredEntity>,
    pub text_units: Vec<ScoredTextUnit>,
    pub communities: Vec<ScoredCommunity>,
    /// End-to-end execution time, query receipt to result assembly.
    pub execution_time_ms: f64,
}

// =============================================================================
// Info Types
// =============================================================================

/// Per-session counts surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub document_count: usize,
    pub text_unit_count: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub community_count: usize,
    pub created_at: String,
    pub last_access_at: String,
}

/// Engine-wide aggregate counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInfo {
    pub version: String,
    pub session_count: usize,
    pub document_count: usize,
    pub text_unit_count: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub community_count: usize,
}
