//! HTTP surface tests: route wiring, facet gating, and error mapping.

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::json;

use graphmem::AppState;
use graphmem::api::build_router;
use graphmem::config::{AppConfig, CapabilityConfig, ServerConfig, SessionDefaults};
use graphmem::domain::{EngineInfo, IndexStats, QueryResult, SessionInfo};
use graphmem::engine::Engine;
use graphmem::rag::embedding::HashedEmbedder;
use graphmem::rag::extraction::PatternExtractor;

fn test_server() -> TestServer {
    let config = AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            request_timeout_seconds: 30,
        },
        capabilities: CapabilityConfig {
            extractor: "pattern".to_string(),
            extractor_url: None,
            embedder: "hashed".to_string(),
            hashed_dimension: 64,
        },
        session: SessionDefaults {
            chunk_size: 256,
            chunk_overlap: 32,
            auto_detect_communities: true,
            capability_timeout_seconds: 10,
        },
    };

    let engine = Arc::new(Engine::new(
        Arc::new(PatternExtractor::new()),
        Arc::new(HashedEmbedder::new(64)),
    ));

    let state = AppState {
        engine,
        config: Arc::new(config),
    };

    TestServer::new(build_router().with_state(state)).expect("test server")
}

#[tokio::test]
async fn test_health() {
    let server = test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_index_then_query_roundtrip() {
    let server = test_server();

    let response = server
        .post("/api/sessions/demo/documents")
        .json(&json!({
            "documents": [
                "Python is a programming language created by Guido van Rossum.",
                {"source": "js.txt", "text": "JavaScript was created by Brendan Eich in 1995."}
            ]
        }))
        .await;
    response.assert_status_ok();

    let stats: IndexStats = response.json();
    assert_eq!(stats.documents_indexed, 2);
    assert!(stats.text_units_created >= 2);
    assert!(stats.entities_extracted > 0);

    let response = server
        .post("/api/sessions/demo/query")
        .json(&json!({"text": "programming languages", "top_k": 5}))
        .await;
    response.assert_status_ok();

    let result: QueryResult = response.json();
    assert!(!result.entities.is_empty() || !result.text_units.is_empty());
}

#[tokio::test]
async fn test_facet_gating_over_http() {
    let server = test_server();

    server
        .post("/api/sessions/gate/documents")
        .json(&json!({"documents": ["Machine learning is a subset of artificial intelligence."]}))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/sessions/gate/query")
        .json(&json!({
            "text": "machine learning",
            "include_entities": true,
            "include_text_units": false,
            "include_communities": false
        }))
        .await;
    response.assert_status_ok();

    let result: QueryResult = response.json();
    assert!(result.text_units.is_empty());
    assert!(result.communities.is_empty());
}

#[tokio::test]
async fn test_negative_top_k_is_bad_request() {
    let server = test_server();

    server
        .post("/api/sessions/badk/documents")
        .json(&json!({"documents": ["Some Document."]}))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/sessions/badk/query")
        .json(&json!({"text": "anything", "top_k": -1}))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_invalid_chunk_config_is_bad_request() {
    let server = test_server();

    let response = server
        .post("/api/sessions/badchunk/documents")
        .json(&json!({
            "documents": ["Anything."],
            "chunk_size": 100,
            "chunk_overlap": 100
        }))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_query_unknown_session_is_not_found() {
    let server = test_server();
    let response = server
        .post("/api/sessions/missing/query")
        .json(&json!({"text": "anything"}))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_session_lifecycle_over_http() {
    let server = test_server();

    server
        .post("/api/sessions/life/documents")
        .json(&json!({"documents": ["A Document about Lifecycles."]}))
        .await
        .assert_status_ok();

    let response = server.get("/api/sessions").await;
    let sessions: Vec<SessionInfo> = response.json();
    assert!(sessions.iter().any(|s| s.session_id == "life"));

    let response = server.get("/api/sessions/life").await;
    response.assert_status_ok();
    let info: SessionInfo = response.json();
    assert_eq!(info.document_count, 1);

    let response = server.delete("/api/sessions/life").await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);

    let response = server.delete("/api/sessions/life").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_explicit_community_detection() {
    let server = test_server();

    server
        .post("/api/sessions/comm/documents")
        .json(&json!({"documents": ["Alice met Bob in 1999. Carol met Dave in 2001."]}))
        .await
        .assert_status_ok();

    let response = server.post("/api/sessions/comm/communities").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["communities_detected"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_engine_info() {
    let server = test_server();

    server
        .post("/api/sessions/info-a/documents")
        .json(&json!({"documents": ["First Corpus Document."]}))
        .await
        .assert_status_ok();

    let response = server.get("/api/info").await;
    response.assert_status_ok();
    let info: EngineInfo = response.json();
    assert_eq!(info.session_count, 1);
    assert_eq!(info.document_count, 1);
    assert!(!info.version.is_empty());
}
