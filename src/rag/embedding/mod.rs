//! Text Embedding Capabilities
//!
//! The pluggable capability trait for turning text into fixed-dimension
//! vectors, plus cosine similarity shared by the query engine and the
//! community detector.

pub mod hashed;
pub mod local;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};

pub use hashed::HashedEmbedder;
pub use local::LocalEmbedder;

// =============================================================================
// Embedding Capability Trait
// =============================================================================

/// Capability contract for embedding batches of text.
///
/// Implementations return one vector per input, in input order, with a fixed
/// dimensionality per instance. Identical text through the same instance is
/// acceptable to cache.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed a batch of texts, one vector per text, same order.
    async fn embed(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>>;

    /// Embed a single text. Default: `embed` on a one-element batch.
    async fn embed_single(&self, text: &str) -> EngineResult<Vec<f32>> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| EngineError::Embedding("embedder returned no vector".to_string()))
    }

    /// Fixed output dimensionality of this embedder instance.
    fn dimension(&self) -> usize;

    /// Name of this embedding capability, for logs and diagnostics.
    fn name(&self) -> &'static str;
}

/// Verify that a batch result honors the embedder contract: one vector per
/// input and a consistent dimensionality. A mismatch is fatal, not retried.
pub fn check_batch_contract(
    vectors: &[Vec<f32>],
    expected_len: usize,
    dimension: usize,
) -> EngineResult<()> {
    if vectors.len() != expected_len {
        return Err(EngineError::Embedding(format!(
            "embedder returned {} vectors for {} inputs",
            vectors.len(),
            expected_len
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EngineError::Embedding(format!(
            "dimensionality mismatch: expected {}, got {}",
            dimension,
            bad.len()
        )));
    }
    Ok(())
}

// =============================================================================
// Vector Math
// =============================================================================

/// Cosine similarity between two vectors. Zero-magnitude or mismatched
/// inputs score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

// =============================================================================
// Tests
// =============================================================================
