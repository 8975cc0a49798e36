//! Local Embedding Model
//!
//! Embedding capability backed by a fastembed model running in-process.
//! Inference is CPU-bound, so the model is taken out of its mutex and run on
//! a blocking thread, then put back.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::{TextEmbedder, check_batch_contract};
use crate::error::{EngineError, EngineResult};

/// Output dimensionality of the BGE-small model.
const BGE_SMALL_DIM: usize = 384;

/// Embedding capability backed by the BGE-Small-En-V1.5 fastembed model.
pub struct LocalEmbedder {
    model: Arc<Mutex<Option<TextEmbedding>>>,
    dimension: usize,
}

impl std::fmt::Debug for LocalEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedder")
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl LocalEmbedder {
    /// Create an uninitialized embedder. The model is loaded by
    /// [`Self::initialize`], which downloads weights on first use.
    pub fn new() -> Self {
        Self {
            model: Arc::new(Mutex::new(None)),
            dimension: BGE_SMALL_DIM,
        }
    }

    /// Load the model if it is not already loaded. Called lazily from
    /// [`TextEmbedder::embed`]; exposed so servers can warm up before
    /// accepting traffic (the first load downloads model weights).
    pub async fn initialize(&self) -> EngineResult<()> {
        let mut guard = self.model.lock().await;
        if guard.is_none() {
            info!("Initializing fastembed model (BGE-Small-En-V1.5)...");
            let model = tokio::task::spawn_blocking(|| {
                let options = InitOptions::new(EmbeddingModel::BGESmallENV15)
                    .with_show_download_progress(false);
                TextEmbedding::try_new(options)
            })
            .await
            .map_err(|e| EngineError::Embedding(format!("model init task panicked: {e}")))?
            .map_err(|e| EngineError::Embedding(format!("model init failed: {e}")))?;
            *guard = Some(model);
        }
        Ok(())
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextEmbedder for LocalEmbedder {
    async fn embed(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.initialize().await?;

        let mut guard = self.model.lock().await;
        let mut owned_model = guard
            .take()
            .ok_or_else(|| EngineError::Embedding("embedder not initialized".to_string()))?;

        // TextEmbedding::embed is synchronous and CPU-heavy; move the model
        // onto a blocking thread and reclaim it afterwards.
        let batch: Vec<String> = texts.to_vec();
        let (result, returned_model) = tokio::task::spawn_blocking(move || {
            let res = owned_model.embed(batch, None);
            (res, owned_model)
        })
        .await
        .map_err(|e| EngineError::Embedding(format!("embedding task panicked: {e}")))?;

        *guard = Some(returned_model);

        let vectors = result.map_err(|e| EngineError::Embedding(e.to_string()))?;
        check_batch_contract(&vectors, texts.len(), self.dimension)?;
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "fastembed_bge_small"
    }
}
