//! Engine Facade
//!
//! Owns the capability plug-ins and the session store, and exposes the
//! session-scoped operations callers use: implicit session creation,
//! indexing, querying, community detection, and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{EngineInfo, SessionInfo};
use crate::error::{EngineError, EngineResult};
use crate::rag::embedding::TextEmbedder;
use crate::rag::extraction::EntityExtractor;
use crate::session::{Session, SessionConfig, SessionStore};

/// The knowledge-graph indexing and retrieval engine.
///
/// One engine instance serves many isolated sessions; all sessions share
/// the same extraction and embedding capabilities.
pub struct Engine {
    extractor: Arc<dyn EntityExtractor>,
    embedder: Arc<dyn TextEmbedder>,
    sessions: SessionStore,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("extractor", &self.extractor.name())
            .field("embedder", &self.embedder.name())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl Engine {
    pub fn new(extractor: Arc<dyn EntityExtractor>, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            extractor,
            embedder,
            sessions: SessionStore::new(),
        }
    }

    /// Get or implicitly create the session named by `config.session_id`.
    /// The configuration is validated before any document is processed.
    pub fn session(&self, config: SessionConfig) -> EngineResult<Session> {
        self.sessions.get_or_create(
            config,
            Arc::clone(&self.extractor),
            Arc::clone(&self.embedder),
        )
    }

    /// Get an existing session; never creates one.
    pub fn get_session(&self, id: &str) -> EngineResult<Session> {
        self.sessions
            .get(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    /// Close a session: drain in-flight merges, release its data, and forget
    /// it. Returns whether the session existed.
    pub fn close_session(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Evict sessions idle longer than `timeout`. The trigger policy is the
    /// caller's.
    pub fn evict_idle(&self, timeout: Duration) -> usize {
        self.sessions.evict_idle(timeout)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Info for every live session, in session-id order.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .list_ids()
            .iter()
            .filter_map(|id| self.sessions.get(id).map(|s| s.info()))
            .collect()
    }

    pub fn session_info(&self, id: &str) -> EngineResult<SessionInfo> {
        self.get_session(id).map(|s| s.info())
    }

    /// Aggregate counts across all sessions.
    pub fn info(&self) -> EngineInfo {
        let sessions = self.list_sessions();
        EngineInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            session_count: sessions.len(),
            document_count: sessions.iter().map(|s| s.document_count).sum(),
            text_unit_count: sessions.iter().map(|s| s.text_unit_count).sum(),
            entity_count: sessions.iter().map(|s| s.entity_count).sum(),
            relationship_count: sessions.iter().map(|s| s.relationship_count).sum(),
            community_count: sessions.iter().map(|s| s.community_count).sum(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
