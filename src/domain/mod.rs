//! Domain Models
//!
//! Serde-derived data structures shared across the indexing pipeline, the
//! graph store, and the query engine.

pub mod document;
pub mod graph;

pub use document::{
    Document, DocumentInput, EngineInfo, IndexStats, QueryRequest, QueryResult, ScoredCommunity,
    ScoredEntity, ScoredTextUnit, SessionInfo, TextUnit,
};
pub use graph::{
    Community, Entity, EntityKey, EntityType, ExtractedEntity, ExtractedRelationship, Extraction,
    Relationship, RelationshipKey,
};
