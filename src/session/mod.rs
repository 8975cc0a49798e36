//! Session Store and Lifecycle
//!
//! A session is the isolation boundary: one graph, one text-unit store,
//! zero-or-more communities, and cumulative indexing statistics, keyed by a
//! caller-supplied identifier. Sessions are created implicitly on first use
//! and torn down explicitly or by the caller's idle-eviction policy.
//!
//! Concurrency: the pure pipeline stages run without locks; the graph merge
//! is a critical section under the session's write lock, so merges for one
//! session are serialized while queries share read locks and sessions never
//! contend with each other. No lock is held across an await.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::{
    Community, DocumentInput, IndexStats, QueryRequest, QueryResult, SessionInfo,
};
use crate::error::{EngineError, EngineResult};
use crate::graph::KnowledgeGraph;
use crate::graph::community::{CommunityConfig, CommunityDetector};
use crate::rag::chunking::Chunker;
use crate::rag::embedding::TextEmbedder;
use crate::rag::extraction::EntityExtractor;
use crate::rag::indexer::{Indexer, PreparedBatch};
use crate::rag::query;

// =============================================================================
// Session Configuration
// =============================================================================

/// Per-session knobs, validated once at session creation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Non-empty session identifier. Required.
    pub session_id: String,
    /// Target text-unit size in characters.
    pub chunk_size: usize,
    /// Overlap between neighboring text units; must be < `chunk_size`.
    pub chunk_overlap: usize,
    /// Run community detection after each indexing batch.
    pub auto_detect_communities: bool,
    /// Upper bound on merged description evidence per entity/relationship.
    pub max_description_len: usize,
    /// Ceiling for accumulated relationship weights.
    pub weight_cap: f32,
    /// Caller-enforced timeout for one extraction/embedding call.
    pub capability_timeout: Duration,
    /// Concurrent extraction fan-out within a batch (0 = number of CPUs).
    pub concurrency: usize,
    /// Community detection parameters.
    pub community: CommunityConfig,
}

impl SessionConfig {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            chunk_size: 800,
            chunk_overlap: 100,
            auto_detect_communities: true,
            max_description_len: crate::graph::DEFAULT_MAX_DESCRIPTION_LEN,
            weight_cap: crate::graph::DEFAULT_WEIGHT_CAP,
            capability_timeout: Duration::from_secs(30),
            concurrency: 0,
            community: CommunityConfig::default(),
        }
    }

    /// Validate the configuration. Called at session creation, not per call.
    pub fn validate(&self) -> EngineResult<()> {
        if self.session_id.trim().is_empty() {
            return Err(EngineError::Configuration(
                "session_id is required".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(EngineError::Configuration(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(EngineError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.weight_cap <= 0.0 {
            return Err(EngineError::Configuration(
                "weight_cap must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Session
// =============================================================================

/// Everything a merge commit or a query reads, behind one lock.
#[derive(Debug)]
struct SessionState {
    documents: BTreeMap<u64, crate::domain::Document>,
    text_units: BTreeMap<u64, crate::domain::TextUnit>,
    graph: KnowledgeGraph,
    communities: Vec<Community>,
}

/// A single indexing/query session.
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    indexer: Indexer,
    embedder: Arc<dyn TextEmbedder>,
    detector: CommunityDetector,
    state: RwLock<SessionState>,
    stats: RwLock<IndexStats>,
    next_document_id: AtomicU64,
    next_text_unit_id: AtomicU64,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.inner.config.session_id)
            .finish()
    }
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Session {
    /// Create a session from a validated configuration and the engine's
    /// capability plug-ins.
    fn new(
        config: SessionConfig,
        extractor: Arc<dyn EntityExtractor>,
        embedder: Arc<dyn TextEmbedder>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap)?;
        let concurrency = if config.concurrency == 0 {
            num_cpus::get()
        } else {
            config.concurrency
        };
        let indexer = Indexer::new(
            chunker,
            extractor,
            Arc::clone(&embedder),
            config.capability_timeout,
            concurrency,
        );

        let now = Utc::now();
        Ok(Self {
            inner: Arc::new(SessionInner {
                detector: CommunityDetector::with_config(config.community.clone()),
                state: RwLock::new(SessionState {
                    documents: BTreeMap::new(),
                    text_units: BTreeMap::new(),
                    graph: KnowledgeGraph::new(config.max_description_len, config.weight_cap),
                    communities: Vec::new(),
                }),
                stats: RwLock::new(IndexStats::default()),
                next_document_id: AtomicU64::new(1),
                next_text_unit_id: AtomicU64::new(1),
                created_at: now,
                last_activity: RwLock::new(now),
                indexer,
                embedder,
                config,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.config.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Cumulative indexing statistics.
    pub fn stats(&self) -> IndexStats {
        *self.inner.stats.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Counts and timestamps for this session.
    pub fn info(&self) -> SessionInfo {
        let state = self.inner.state.read().unwrap_or_else(|e| e.into_inner());
        SessionInfo {
            session_id: self.inner.config.session_id.clone(),
            document_count: state.documents.len(),
            text_unit_count: state.text_units.len(),
            entity_count: state.graph.entity_count(),
            relationship_count: state.graph.relationship_count(),
            community_count: state.communities.len(),
            created_at: self.inner.created_at.to_rfc3339(),
            last_access_at: self
                .inner
                .last_activity
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .to_rfc3339(),
        }
    }

    fn touch(&self) {
        let mut guard = self
            .inner
            .last_activity
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *guard = Utc::now();
    }

    /// Whether the session has been idle longer than `timeout`.
    pub fn is_idle_longer_than(&self, timeout: Duration) -> bool {
        let last = *self
            .inner
            .last_activity
            .read()
            .unwrap_or_else(|e| e.into_inner());
        (Utc::now() - last).to_std().is_ok_and(|d| d > timeout)
    }

    // -------------------------------------------------------------------------
    // Indexing
    // -------------------------------------------------------------------------

    /// Index a set of documents in batches of `batch_size`.
    ///
    /// Batching is an internal parallelism knob: observable counts do not
    /// depend on it. Returns the session's cumulative statistics.
    pub async fn index_documents(
        &self,
        documents: Vec<DocumentInput>,
        batch_size: usize,
    ) -> EngineResult<IndexStats> {
        if batch_size == 0 {
            return Err(EngineError::Configuration(
                "batch_size must be positive".to_string(),
            ));
        }
        self.touch();
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4();

        info!(
            session_id = %self.id(),
            run_id = %run_id,
            documents = documents.len(),
            batch_size,
            "indexing started"
        );

        for chunk in documents.chunks(batch_size) {
            let prepared = self
                .inner
                .indexer
                .prepare_batch(
                    chunk,
                    &self.inner.next_document_id,
                    &self.inner.next_text_unit_id,
                )
                .await?;

            // Merge commit, retried once on an invariant violation.
            let mut attempt = 0;
            loop {
                match self.commit_batch(&prepared) {
                    Ok(()) => break,
                    Err(err) if attempt == 0 => {
                        attempt = 1;
                        warn!(
                            session_id = %self.id(),
                            error = %err,
                            "merge commit failed; retrying batch once"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }

            if self.inner.config.auto_detect_communities {
                self.detect_communities().await?;
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        let stats = {
            let mut stats = self.inner.stats.write().unwrap_or_else(|e| e.into_inner());
            stats.indexing_time_seconds += elapsed;
            *stats
        };

        info!(
            session_id = %self.id(),
            run_id = %run_id,
            documents = stats.documents_indexed,
            entities = stats.entities_extracted,
            relationships = stats.relationships_extracted,
            elapsed_seconds = elapsed,
            "indexing complete"
        );

        Ok(stats)
    }

    /// Commit one prepared batch under the session write lock. This is the
    /// only place the graph mutates, so merges are serialized per session
    /// and a query never observes a half-merged batch.
    fn commit_batch(&self, prepared: &PreparedBatch) -> EngineResult<()> {
        for unit in &prepared.merge_units {
            if unit.entity_embeddings.len() != unit.extraction.entities.len() {
                return Err(EngineError::Indexing(format!(
                    "corrupted batch: {} embeddings for {} entities in unit {}",
                    unit.entity_embeddings.len(),
                    unit.extraction.entities.len(),
                    unit.text_unit_id
                )));
            }
        }

        let mut state = self
            .inner
            .state
            .write()
            .map_err(|_| EngineError::Indexing("session state poisoned".to_string()))?;

        for doc in &prepared.documents {
            state.documents.insert(doc.id, doc.clone());
        }
        for unit in &prepared.text_units {
            state.text_units.insert(unit.id, unit.clone());
        }

        let outcome = state.graph.merge_extractions(&prepared.merge_units);

        // Back-link text units to the entities extracted from them.
        for (unit_id, entity_ids) in &outcome.unit_entity_links {
            if let Some(unit) = state.text_units.get_mut(unit_id) {
                unit.entity_ids = entity_ids.clone();
            }
        }
        drop(state);

        let mut stats = self.inner.stats.write().unwrap_or_else(|e| e.into_inner());
        stats.documents_indexed += prepared.documents.len() as u64;
        stats.text_units_created += prepared.text_units.len() as u64;
        stats.entities_extracted += prepared.entities_extracted;
        stats.relationships_extracted += prepared.relationships_extracted;
        stats.relationships_rejected += outcome.relationships_rejected;
        stats.units_failed += prepared.units_failed;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Community Detection
    // -------------------------------------------------------------------------

    /// Run a community detection pass and replace the session's communities.
    ///
    /// The graph is snapshotted under a read lock (copy-on-read), detection
    /// and summary embedding run without any lock, and the result is swapped
    /// in under a brief write. Returns the number of communities detected.
    pub async fn detect_communities(&self) -> EngineResult<usize> {
        self.touch();

        let (entities, relationships) = {
            let state = self
                .inner
                .state
                .read()
                .map_err(|_| EngineError::Indexing("session state poisoned".to_string()))?;
            (
                state.graph.entities().cloned().collect::<Vec<_>>(),
                state.graph.relationships().cloned().collect::<Vec<_>>(),
            )
        };

        let mut communities = self.inner.detector.detect(&entities, &relationships);

        if !communities.is_empty() {
            let summaries: Vec<String> = communities.iter().map(|c| c.summary.clone()).collect();
            match tokio::time::timeout(
                self.inner.config.capability_timeout,
                self.inner.embedder.embed(&summaries),
            )
            .await
            {
                Ok(Ok(vectors)) if vectors.len() == communities.len() => {
                    for (community, vector) in communities.iter_mut().zip(vectors) {
                        community.embedding = vector;
                    }
                }
                Ok(Ok(_)) | Ok(Err(_)) | Err(_) => {
                    warn!(
                        session_id = %self.id(),
                        "community summary embedding failed; communities stored without vectors"
                    );
                }
            }
        }

        let count = communities.len();
        {
            let mut state = self
                .inner
                .state
                .write()
                .map_err(|_| EngineError::Indexing("session state poisoned".to_string()))?;
            state.communities = communities;
        }
        {
            let mut stats = self.inner.stats.write().unwrap_or_else(|e| e.into_inner());
            stats.communities_detected = count as u64;
        }

        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Query
    // -------------------------------------------------------------------------

    /// Resolve a query into ranked, scored facet results.
    ///
    /// Disabled facets are never scored. A session with no text units and no
    /// entities yields empty results, not an error.
    pub async fn query(&self, request: QueryRequest) -> EngineResult<QueryResult> {
        let started = Instant::now();
        self.touch();

        let mut result = QueryResult::default();

        // All facets disabled: cheap no-op, skip the embedding call too.
        if request.is_noop() {
            result.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
            return Ok(result);
        }

        let empty = {
            let state = self
                .inner
                .state
                .read()
                .map_err(|_| EngineError::Query("session state poisoned".to_string()))?;
            state.text_units.is_empty() && state.graph.entity_count() == 0
        };
        if empty {
            result.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
            return Ok(result);
        }

        // Embed the query once, outside any lock.
        let query_vector = tokio::time::timeout(
            self.inner.config.capability_timeout,
            self.inner.embedder.embed_single(&request.text),
        )
        .await
        .map_err(|_| EngineError::Embedding("query embedding timed out".to_string()))??;

        let state = self
            .inner
            .state
            .read()
            .map_err(|_| EngineError::Query("session state poisoned".to_string()))?;

        if request.include_entities {
            result.entities =
                query::rank_entities(&query_vector, state.graph.entities(), request.top_k);
        }
        if request.include_text_units {
            result.text_units =
                query::rank_text_units(&query_vector, state.text_units.values(), request.top_k);
        }
        if request.include_communities {
            result.communities =
                query::rank_communities(&query_vector, state.communities.iter(), request.top_k);
        }
        drop(state);

        result.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Drain in-flight merges and release the session's data.
    ///
    /// Acquiring the write lock guarantees no merge commit is mid-flight
    /// when the state is dropped; the guard discipline holds on error paths.
    pub fn close(&self) {
        let mut state = self.inner.state.write().unwrap_or_else(|e| e.into_inner());
        state.documents.clear();
        state.text_units.clear();
        state.communities.clear();
        state.graph = KnowledgeGraph::new(
            self.inner.config.max_description_len,
            self.inner.config.weight_cap,
        );
        info!(session_id = %self.id(), "session closed");
    }
}

// =============================================================================
// Session Store
// =============================================================================

/// Thread-safe registry of sessions keyed by session identifier.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a session by id.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Get a session, creating it from `config` if it does not exist.
    /// Configuration is validated before the session becomes visible.
    pub fn get_or_create(
        &self,
        config: SessionConfig,
        extractor: Arc<dyn EntityExtractor>,
        embedder: Arc<dyn TextEmbedder>,
    ) -> EngineResult<Session> {
        {
            let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if let Some(session) = guard.get(&config.session_id) {
                return Ok(session.clone());
            }
        }

        let session = Session::new(config, extractor, embedder)?;
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        // A racing creator may have won; keep the first one registered.
        let entry = guard
            .entry(session.id().to_string())
            .or_insert_with(|| session.clone());
        Ok(entry.clone())
    }

    /// Remove a session, draining its in-flight merges first.
    pub fn remove(&self, id: &str) -> Option<Session> {
        let removed = self
            .inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        if let Some(session) = &removed {
            session.close();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// List all session ids.
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Remove sessions idle longer than `timeout`; returns how many were
    /// evicted. Eviction policy (when to call this) belongs to the caller.
    pub fn evict_idle(&self, timeout: Duration) -> usize {
        let idle: Vec<String> = {
            let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
            guard
                .iter()
                .filter(|(_, s)| s.is_idle_longer_than(timeout))
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in &idle {
            self.remove(id);
        }
        idle.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
