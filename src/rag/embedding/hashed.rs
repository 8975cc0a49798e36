//! Hash-Derived Embedder
//!
//! Deterministic embedding capability: vectors are derived from SHA-256
//! digests of the input text, normalized to unit length. No model, no
//! network, identical text always maps to the identical vector. Intended
//! for tests and offline runs, not for semantic quality.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{TextEmbedder, check_batch_contract};
use crate::error::EngineResult;

/// Deterministic SHA-256-derived embedding capability.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dimension: usize,
}

impl HashedEmbedder {
    /// Create an embedder producing unit vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = Vec::with_capacity(self.dimension);
        let mut counter: u32 = 0;

        // Stretch the digest stream until the vector is full: hash the text
        // with an incrementing counter suffix, 8 components per digest.
        while vec.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();

            for chunk in digest.chunks_exact(4) {
                if vec.len() >= self.dimension {
                    break;
                }
                let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // Map to [-1, 1].
                let value = (f64::from(raw) / f64::from(u32::MAX)) as f32 * 2.0 - 1.0;
                vec.push(value);
            }
            counter += 1;
        }

        // Normalize so cosine scores stay well-conditioned.
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vec {
                *x /= norm;
            }
        }
        vec
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl TextEmbedder for HashedEmbedder {
    async fn embed(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        let vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.embed_one(t)).collect();
        check_batch_contract(&vectors, texts.len(), self.dimension)?;
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "hashed"
    }
}

// =============================================================================
// Tests
// =============================================================================
