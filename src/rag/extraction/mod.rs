//! Entity and Relationship Extraction Capabilities
//!
//! Provides the pluggable capability trait and implementations for turning
//! a text unit into candidate entities and relationships. The engine
//! depends only on the trait, never on a concrete provider.

pub mod external_nlp;
pub mod pattern;

use async_trait::async_trait;

use crate::domain::Extraction;
use crate::error::EngineResult;

pub use external_nlp::ExternalNlpExtractor;
pub use pattern::PatternExtractor;

// =============================================================================
// Extraction Capability Trait
// =============================================================================

/// Capability contract for extracting entities and relationships from text.
///
/// Implementations must be pure functions of their input text and safe to
/// call concurrently from multiple text units. Failures are isolated to the
/// offending unit by the caller.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Extract entity and relationship candidates from one text unit.
    async fn extract(&self, text: &str) -> EngineResult<Extraction>;

    /// Name of this extraction capability, for logs and diagnostics.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Extraction Configuration
// =============================================================================

/// Knobs shared by extraction capabilities.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Minimum confidence for an entity candidate to be kept.
    pub min_confidence: f32,
    /// Maximum entity candidates per text unit.
    pub max_entities: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_entities: 50,
        }
    }
}
