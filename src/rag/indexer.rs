//! Indexing Pipeline
//!
//! The pure, side-effect-free stages of an indexing batch: chunk documents,
//! embed text units, and extract entities/relationships with bounded
//! concurrency and per-call timeouts. The output is a [`PreparedBatch`]
//! that the owning session commits to its graph under its write lock.
//!
//! Capability failures are isolated: a failed or timed-out extraction skips
//! its unit, a failed embedding batch leaves its vectors empty; both are
//! counted, and the batch carries on. A dimensionality violation from the
//! embedder is fatal for the call.

use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{Document, DocumentInput, Extraction, TextUnit};
use crate::error::{EngineError, EngineResult};
use crate::graph::MergeUnit;
use crate::rag::chunking::Chunker;
use crate::rag::embedding::{TextEmbedder, check_batch_contract};
use crate::rag::extraction::EntityExtractor;

// =============================================================================
// Pipeline Output
// =============================================================================

/// The fully prepared, not-yet-committed output of one indexing batch.
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub documents: Vec<Document>,
    /// Text units with embeddings filled where embedding succeeded.
    pub text_units: Vec<TextUnit>,
    /// Per-unit extraction output ready for the graph merge.
    pub merge_units: Vec<MergeUnit>,
    /// Extracted entity records (pre-merge).
    pub entities_extracted: u64,
    /// Extracted relationship records (pre-merge).
    pub relationships_extracted: u64,
    /// Units that lost a capability call (extraction or embedding).
    pub units_failed: u64,
}

// =============================================================================
// Indexer
// =============================================================================

/// Runs the pure stages of an indexing batch.
pub struct Indexer {
    chunker: Chunker,
    extractor: Arc<dyn EntityExtractor>,
    embedder: Arc<dyn TextEmbedder>,
    /// Caller-enforced timeout for a single capability call.
    capability_timeout: Duration,
    /// Concurrent extraction fan-out per batch.
    concurrency: usize,
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("chunker", &self.chunker)
            .field("extractor", &self.extractor.name())
            .field("embedder", &self.embedder.name())
            .field("capability_timeout", &self.capability_timeout)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Indexer {
    pub fn new(
        chunker: Chunker,
        extractor: Arc<dyn EntityExtractor>,
        embedder: Arc<dyn TextEmbedder>,
        capability_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            chunker,
            extractor,
            embedder,
            capability_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Chunk, embed, and extract one batch of documents. Ids are drawn from
    /// the session's counters so concurrent batches never collide.
    pub async fn prepare_batch(
        &self,
        inputs: &[DocumentInput],
        next_document_id: &AtomicU64,
        next_text_unit_id: &AtomicU64,
    ) -> EngineResult<PreparedBatch> {
        let mut batch = PreparedBatch::default();

        // Stage 1: chunking (pure, synchronous).
        for input in inputs {
            let document_id = next_document_id.fetch_add(1, Ordering::Relaxed);
            let source = input
                .source
                .clone()
                .unwrap_or_else(|| format!("doc-{document_id}"));

            let chunks: Vec<&str> = self.chunker.chunks(&input.text).collect();
            let first_unit_id =
                next_text_unit_id.fetch_add(chunks.len() as u64, Ordering::Relaxed);

            batch.documents.push(Document {
                id: document_id,
                source,
                length: input.text.chars().count(),
                created_at: chrono::Utc::now().to_rfc3339(),
            });
            batch
                .text_units
                .extend(chunks.into_iter().enumerate().map(|(sequence, content)| {
                    TextUnit {
                        id: first_unit_id + sequence as u64,
                        document_id,
                        sequence,
                        content: content.to_string(),
                        embedding: Vec::new(),
                        entity_ids: Vec::new(),
                    }
                }));
        }

        debug!(
            documents = batch.documents.len(),
            text_units = batch.text_units.len(),
            "batch chunked"
        );

        if batch.text_units.is_empty() {
            return Ok(batch);
        }

        // Stage 2: text-unit embeddings, one call for the whole batch.
        let mut embed_failed = vec![false; batch.text_units.len()];
        let contents: Vec<String> = batch.text_units.iter().map(|u| u.content.clone()).collect();
        match self.embed_checked(&contents).await {
            Ok(vectors) => {
                for (unit, vector) in batch.text_units.iter_mut().zip(vectors) {
                    unit.embedding = vector;
                }
            }
            Err(fatal @ EngineError::Embedding(_)) if is_contract_violation(&fatal) => {
                return Err(fatal);
            }
            Err(err) => {
                warn!(error = %err, "text-unit embedding failed; units kept without vectors");
                embed_failed.iter_mut().for_each(|f| *f = true);
            }
        }

        // Stage 3: extraction, fanned out across units with per-call timeouts.
        let extractions = self.extract_units(&batch.text_units).await;

        // Stage 4: entity description embeddings, one call for all candidates.
        let mut extract_failed = vec![false; batch.text_units.len()];
        let mut descriptions = Vec::new();
        for (i, result) in extractions.iter().enumerate() {
            match result {
                Some(extraction) => {
                    for entity in &extraction.entities {
                        descriptions.push(entity.description.clone());
                    }
                }
                None => extract_failed[i] = true,
            }
        }

        let mut description_vectors: Vec<Vec<f32>> = Vec::new();
        if !descriptions.is_empty() {
            match self.embed_checked(&descriptions).await {
                Ok(vectors) => description_vectors = vectors,
                Err(fatal @ EngineError::Embedding(_)) if is_contract_violation(&fatal) => {
                    return Err(fatal);
                }
                Err(err) => {
                    warn!(error = %err, "entity embedding failed; entities merged without vectors");
                }
            }
        }

        // Assemble merge units, distributing description vectors in order.
        let mut cursor = 0usize;
        for (unit, extraction) in batch.text_units.iter().zip(extractions) {
            let Some(extraction) = extraction else {
                continue;
            };
            let count = extraction.entities.len();
            let entity_embeddings: Vec<Vec<f32>> = if description_vectors.is_empty() {
                vec![Vec::new(); count]
            } else {
                description_vectors[cursor..cursor + count].to_vec()
            };
            cursor += count;

            batch.entities_extracted += count as u64;
            batch.relationships_extracted += extraction.relationships.len() as u64;
            batch.merge_units.push(MergeUnit {
                text_unit_id: unit.id,
                extraction,
                entity_embeddings,
            });
        }

        batch.units_failed = embed_failed
            .iter()
            .zip(&extract_failed)
            .filter(|(e, x)| **e || **x)
            .count() as u64;

        Ok(batch)
    }

    /// Run extraction for every unit with bounded concurrency. `None` marks
    /// a unit whose extraction failed or timed out.
    async fn extract_units(&self, units: &[TextUnit]) -> Vec<Option<Extraction>> {
        let inputs: Vec<(usize, u64, String)> = units
            .iter()
            .enumerate()
            .map(|(i, unit)| (i, unit.id, unit.content.clone()))
            .collect();
        let results: Vec<(usize, Option<Extraction>)> = futures::stream::iter(
            inputs.into_iter().map(|(i, unit_id, content)| {
                let extractor = Arc::clone(&self.extractor);
                let timeout = self.capability_timeout;
                async move {
                    let outcome =
                        tokio::time::timeout(timeout, extractor.extract(&content)).await;
                    match outcome {
                        Ok(Ok(extraction)) => (i, Some(extraction)),
                        Ok(Err(err)) => {
                            warn!(text_unit = unit_id, error = %err, "extraction failed; unit skipped");
                            (i, None)
                        }
                        Err(_) => {
                            warn!(text_unit = unit_id, "extraction timed out; unit skipped");
                            (i, None)
                        }
                    }
                }
            }),
        )
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        let mut ordered: Vec<Option<Extraction>> = vec![None; units.len()];
        for (i, extraction) in results {
            ordered[i] = extraction;
        }
        ordered
    }

    /// Embed a batch with the caller-enforced timeout, then verify the
    /// embedder contract (one vector per input, fixed dimensionality).
    async fn embed_checked(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        let vectors = tokio::time::timeout(self.capability_timeout, self.embedder.embed(texts))
            .await
            .map_err(|_| EngineError::Embedding("embedding call timed out".to_string()))??;

        check_batch_contract(&vectors, texts.len(), self.embedder.dimension())
            .map_err(|e| EngineError::Embedding(format!("{CONTRACT_VIOLATION_PREFIX}{e}")))?;
        Ok(vectors)
    }
}

const CONTRACT_VIOLATION_PREFIX: &str = "contract violation: ";

fn is_contract_violation(err: &EngineError) -> bool {
    matches!(err, EngineError::Embedding(msg) if msg.starts_with(CONTRACT_VIOLATION_PREFIX))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Extraction;
    use crate::rag::embedding::HashedEmbedder;
    use crate::rag::extraction::PatternExtractor;
    use async_trait::async_trait;

    fn indexer_with(
        extractor: Arc<dyn EntityExtractor>,
        embedder: Arc<dyn TextEmbedder>,
    ) -> Indexer {
        Indexer::new(
            Chunker::new(200, 20).unwrap(),
            extractor,
            embedder,
            Duration::from_secs(5),
            4,
        )
    }

    #[tokio::test]
    async fn test_prepare_batch_fills_embeddings_and_extractions() {
        let indexer = indexer_with(
            Arc::new(PatternExtractor::new()),
            Arc::new(HashedEmbedder::new(32)),
        );
        let docs = AtomicU64::new(1);
        let units = AtomicU64::new(1);

        let inputs = vec![DocumentInput::new(
            "Albert Einstein published the theory in 1905.",
        )];
        let batch = indexer.prepare_batch(&inputs, &docs, &units).await.unwrap();

        assert_eq!(batch.documents.len(), 1);
        assert_eq!(batch.text_units.len(), 1);
        assert_eq!(batch.text_units[0].embedding.len(), 32);
        assert!(batch.entities_extracted > 0);
        assert_eq!(batch.units_failed, 0);

        // Entity embeddings are parallel to extracted entities.
        let merge = &batch.merge_units[0];
        assert_eq!(merge.entity_embeddings.len(), merge.extraction.entities.len());
    }

    #[tokio::test]
    async fn test_empty_document_creates_no_units() {
        let indexer = indexer_with(
            Arc::new(PatternExtractor::new()),
            Arc::new(HashedEmbedder::new(32)),
        );
        let docs = AtomicU64::new(1);
        let units = AtomicU64::new(1);

        let batch = indexer
            .prepare_batch(&[DocumentInput::new("")], &docs, &units)
            .await
            .unwrap();
        assert_eq!(batch.documents.len(), 1);
        assert!(batch.text_units.is_empty());
        assert!(batch.merge_units.is_empty());
    }

    /// Extractor that always fails.
    #[derive(Debug)]
    struct FailingExtractor;

    #[async_trait]
    impl EntityExtractor for FailingExtractor {
        async fn extract(&self, _text: &str) -> EngineResult<Extraction> {
            Err(EngineError::Extraction("always fails".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_failing_extractor_is_isolated() {
        let indexer = indexer_with(Arc::new(FailingExtractor), Arc::new(HashedEmbedder::new(32)));
        let docs = AtomicU64::new(1);
        let units = AtomicU64::new(1);

        let inputs = vec![
            DocumentInput::new("First document about Python."),
            DocumentInput::new("Second document about Rust."),
        ];
        let batch = indexer.prepare_batch(&inputs, &docs, &units).await.unwrap();

        // The batch completes: units exist and are embedded, nothing merged.
        assert_eq!(batch.documents.len(), 2);
        assert_eq!(batch.text_units.len(), 2);
        assert_eq!(batch.entities_extracted, 0);
        assert!(batch.merge_units.is_empty());
        assert_eq!(batch.units_failed, 2);
    }

    /// Embedder that violates its dimensionality contract.
    #[derive(Debug)]
    struct LyingEmbedder;

    #[async_trait]
    impl TextEmbedder for LyingEmbedder {
        async fn embed(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.5; 3]).collect())
        }

        fn dimension(&self) -> usize {
            8 // claims 8, returns 3
        }

        fn name(&self) -> &'static str {
            "lying"
        }
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal() {
        let indexer = indexer_with(Arc::new(PatternExtractor::new()), Arc::new(LyingEmbedder));
        let docs = AtomicU64::new(1);
        let units = AtomicU64::new(1);

        let err = indexer
            .prepare_batch(&[DocumentInput::new("Some Text here.")], &docs, &units)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Embedding(_)));
    }
}
