//! Document Chunking
//!
//! Splits raw documents into overlapping text units of bounded size. Chunk
//! boundaries prefer paragraph and sentence breaks within the size window
//! before falling back to a hard cut (delegated to `text_splitter`'s
//! semantic levels).

use text_splitter::{Characters, ChunkConfig, TextSplitter};

use crate::domain::TextUnit;
use crate::error::{EngineError, EngineResult};

/// Splits document text into bounded, overlapping chunks.
///
/// Pure: produces text units and touches nothing else.
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    splitter: TextSplitter<Characters>,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish()
    }
}

impl Chunker {
    /// Create a chunker for the given target size and overlap, both measured
    /// in characters. Overlap must be strictly smaller than the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> EngineResult<Self> {
        if chunk_size == 0 {
            return Err(EngineError::Configuration(
                "chunk_size must be positive".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(EngineError::Configuration(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }

        let config = ChunkConfig::new(chunk_size)
            .with_sizer(Characters)
            .with_trim(true)
            .with_overlap(chunk_overlap)
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        Ok(Self {
            chunk_size,
            chunk_overlap,
            splitter: TextSplitter::new(config),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Lazy, restartable sequence of chunks covering the whole text.
    pub fn chunks<'text>(&'text self, text: &'text str) -> impl Iterator<Item = &'text str> {
        self.splitter.chunks(text)
    }

    /// Materialize text units for a document, assigning sequential unit ids
    /// starting at `first_unit_id`. Embeddings are left empty for the
    /// pipeline to fill.
    pub fn chunk_document(&self, document_id: u64, text: &str, first_unit_id: u64) -> Vec<TextUnit> {
        self.chunks(text)
            .enumerate()
            .map(|(sequence, content)| TextUnit {
                id: first_unit_id + sequence as u64,
                document_id,
                sequence,
                content: content.to_string(),
                embedding: Vec::new(),
                entity_ids: Vec::new(),
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
