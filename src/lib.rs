//! graphmem
//!
//! A session-scoped, in-memory knowledge-graph indexing and retrieval
//! engine. Documents are chunked into overlapping text units, entities and
//! relationships are extracted and merged into a deduplicated graph, the
//! graph is clustered into summarized communities, and queries return
//! ranked entities, text units, and communities.
//!
//! # Architecture
//!
//! - **Pipeline**: chunk -> extract + embed (parallel, pure) -> serialized
//!   graph merge -> community detection
//! - **Capabilities**: extraction and embedding are pluggable contracts;
//!   the engine never depends on a concrete provider
//! - **Isolation**: one graph + index + statistics per session identifier
//! - **Server**: thin axum JSON surface over the engine operations
//!
//! # Modules
//!
//! - [`rag`]: chunking, capability contracts, indexing pipeline, query ranking
//! - [`graph`]: knowledge-graph store and community detection
//! - [`session`]: session store and lifecycle
//! - [`engine`]: the facade tying it all together
//! - [`api`]: HTTP routes

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod graph;
pub mod rag;
pub mod session;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::Engine;

pub use crate::error::{EngineError, EngineResult};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The indexing and retrieval engine.
    pub engine: Arc<Engine>,
    /// Global configuration.
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish()
    }
}
