//! Indexing Pipeline and Query Engine
//!
//! The RAG core: chunking, pluggable extraction and embedding capabilities,
//! the batch indexing pipeline, and query ranking.

pub mod chunking;
pub mod embedding;
pub mod extraction;
pub mod indexer;
pub mod query;
