//! End-to-end engine tests over the library surface, using the pattern
//! extractor and the deterministic hashed embedder so no network or model
//! downloads are involved.

use std::sync::Arc;

use async_trait::async_trait;
use graphmem::domain::{DocumentInput, Extraction, QueryRequest};
use graphmem::engine::Engine;
use graphmem::error::{EngineError, EngineResult};
use graphmem::rag::embedding::HashedEmbedder;
use graphmem::rag::extraction::{EntityExtractor, PatternExtractor};
use graphmem::session::SessionConfig;

fn test_engine() -> Engine {
    Engine::new(
        Arc::new(PatternExtractor::new()),
        Arc::new(HashedEmbedder::new(64)),
    )
}

fn config(id: &str) -> SessionConfig {
    let mut config = SessionConfig::new(id);
    config.chunk_size = 256;
    config.chunk_overlap = 32;
    config
}

const LANGUAGE_DOCS: [&str; 3] = [
    "Python is a high-level programming language created by Guido van Rossum in 1991.",
    "JavaScript was created by Brendan Eich in 1995 at Netscape.",
    "Rust is a systems programming language focused on safety and performance.",
];

fn language_docs() -> Vec<DocumentInput> {
    LANGUAGE_DOCS.iter().map(|d| DocumentInput::new(*d)).collect()
}

#[tokio::test]
async fn test_documents_indexed_independent_of_batch_size() {
    for batch_size in [1, 2, 3, 10] {
        let engine = test_engine();
        let session = engine
            .session(config(&format!("batch-{batch_size}")))
            .unwrap();

        let stats = session
            .index_documents(language_docs(), batch_size)
            .await
            .unwrap();

        assert_eq!(
            stats.documents_indexed, 3,
            "batch_size {batch_size} changed observable counts"
        );
        assert!(stats.text_units_created >= 3);
    }
}

#[tokio::test]
async fn test_nonempty_document_creates_at_least_one_unit() {
    let engine = test_engine();
    let session = engine.session(config("single-char")).unwrap();

    let stats = session
        .index_documents(vec![DocumentInput::new("X")], 1)
        .await
        .unwrap();

    assert_eq!(stats.documents_indexed, 1);
    assert!(stats.text_units_created >= 1);
}

#[tokio::test]
async fn test_reindexing_increments_occurrences_not_entities() {
    let engine = test_engine();
    let session = engine.session(config("dedup")).unwrap();

    let doc = "Ada Lovelace wrote the first program in 1843.";
    session
        .index_documents(vec![DocumentInput::new(doc)], 1)
        .await
        .unwrap();
    let entities_after_first = session.info().entity_count;
    assert!(entities_after_first > 0);

    session
        .index_documents(vec![DocumentInput::new(doc)], 1)
        .await
        .unwrap();

    // Same content again: same distinct entities, higher occurrence counts.
    assert_eq!(session.info().entity_count, entities_after_first);

    let result = session
        .query(QueryRequest::new("Ada Lovelace", 10))
        .await
        .unwrap();
    let ada = result
        .entities
        .iter()
        .find(|e| e.entity.title == "Ada Lovelace")
        .expect("Ada Lovelace entity");
    assert!(ada.entity.occurrence_count >= 2);
}

#[tokio::test]
async fn test_disabled_facets_are_empty() {
    let engine = test_engine();
    let session = engine.session(config("facets")).unwrap();
    session.index_documents(language_docs(), 3).await.unwrap();

    let mut request = QueryRequest::new("programming", 5);
    request.include_entities = false;
    let result = session.query(request).await.unwrap();
    assert!(result.entities.is_empty());
    assert!(!result.text_units.is_empty());

    let mut request = QueryRequest::new("programming", 5);
    request.include_text_units = false;
    request.include_communities = false;
    let result = session.query(request).await.unwrap();
    assert!(result.text_units.is_empty());
    assert!(result.communities.is_empty());

    // All facets disabled: cheap no-op, not an error.
    let mut request = QueryRequest::new("programming", 5);
    request.include_entities = false;
    request.include_text_units = false;
    request.include_communities = false;
    let result = session.query(request).await.unwrap();
    assert!(result.entities.is_empty());
    assert!(result.text_units.is_empty());
    assert!(result.communities.is_empty());
}

#[tokio::test]
async fn test_scores_bounded_and_sorted() {
    let engine = test_engine();
    let session = engine.session(config("scores")).unwrap();
    session.index_documents(language_docs(), 3).await.unwrap();

    let result = session
        .query(QueryRequest::new("systems programming", 50))
        .await
        .unwrap();

    for pair in result.entities.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for pair in result.text_units.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for scored in result
        .entities
        .iter()
        .map(|e| e.score)
        .chain(result.text_units.iter().map(|t| t.score))
        .chain(result.communities.iter().map(|c| c.score))
    {
        assert!((-1.0..=1.0).contains(&scored), "score out of range: {scored}");
    }
    assert!(result.execution_time_ms >= 0.0);
}

#[tokio::test]
async fn test_language_scenario_returns_results() {
    let engine = test_engine();
    let session = engine.session(config("languages")).unwrap();

    let stats = session.index_documents(language_docs(), 3).await.unwrap();
    assert_eq!(stats.documents_indexed, 3);
    assert!(stats.entities_extracted > 0);
    assert!(stats.indexing_time_seconds >= 0.0);

    let result = session
        .query(QueryRequest::new("programming languages", 5))
        .await
        .unwrap();
    assert!(
        !result.entities.is_empty() || !result.text_units.is_empty(),
        "expected a non-empty entity or text-unit result set"
    );
    assert!(result.entities.len() <= 5);
    assert!(result.text_units.len() <= 5);
}

#[tokio::test]
async fn test_overlap_geq_chunk_size_is_configuration_error() {
    let engine = test_engine();
    let mut bad = SessionConfig::new("bad-overlap");
    bad.chunk_size = 128;
    bad.chunk_overlap = 128;

    let err = engine.session(bad).unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
    // Nothing was processed and no session was registered.
    assert_eq!(engine.session_count(), 0);
}

#[tokio::test]
async fn test_empty_session_query_yields_empty_results() {
    let engine = test_engine();
    let session = engine.session(config("empty")).unwrap();

    let result = session
        .query(QueryRequest::new("anything at all", 5))
        .await
        .unwrap();
    assert!(result.entities.is_empty());
    assert!(result.text_units.is_empty());
    assert!(result.communities.is_empty());
}

/// Extractor that always fails, to exercise failure isolation.
#[derive(Debug)]
struct AlwaysFailingExtractor;

#[async_trait]
impl EntityExtractor for AlwaysFailingExtractor {
    async fn extract(&self, _text: &str) -> EngineResult<Extraction> {
        Err(EngineError::Extraction("deliberate failure".to_string()))
    }

    fn name(&self) -> &'static str {
        "always_failing"
    }
}

#[tokio::test]
async fn test_failing_extractor_does_not_abort_indexing() {
    let engine = Engine::new(
        Arc::new(AlwaysFailingExtractor),
        Arc::new(HashedEmbedder::new(64)),
    );
    let session = engine.session(config("failing")).unwrap();

    let stats = session.index_documents(language_docs(), 2).await.unwrap();

    assert_eq!(stats.documents_indexed, 3);
    assert_eq!(stats.entities_extracted, 0);
    assert!(stats.units_failed > 0);

    // Text units still exist and are queryable.
    let result = session
        .query(QueryRequest::new("programming", 5))
        .await
        .unwrap();
    assert!(!result.text_units.is_empty());
    assert!(result.entities.is_empty());
}

#[tokio::test]
async fn test_communities_detected_after_indexing() {
    let engine = test_engine();
    let session = engine.session(config("communities")).unwrap();

    let stats = session.index_documents(language_docs(), 3).await.unwrap();
    assert!(stats.communities_detected > 0);

    let result = session
        .query(QueryRequest::new("programming languages", 5))
        .await
        .unwrap();
    for community in &result.communities {
        assert!(community.community.size >= 1);
        assert!(!community.community.summary.is_empty());
    }

    // An explicit pass replaces the previous partition wholesale.
    let count = session.detect_communities().await.unwrap();
    assert_eq!(count as u64, session.stats().communities_detected);
}
