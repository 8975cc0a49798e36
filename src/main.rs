//! graphmem Server
//!
//! Entry point for the knowledge-graph indexing and retrieval engine.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use graphmem::AppState;
use graphmem::api::build_router;
use graphmem::config::AppConfig;
use graphmem::engine::Engine;
use graphmem::error::EngineError;

#[tokio::main]
async fn main() {
    // Initialize tracing (M-LOG-STRUCTURED)
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // Load .env (if present)
    let _ = dotenv();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        name: "engine.config.loaded",
        extractor = %config.capabilities.extractor,
        embedder = %config.capabilities.embedder,
        "Engine configuration loaded"
    );

    // Capability plug-ins are constructed (and validated) once at startup.
    let extractor = match config.capabilities.build_extractor() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };
    let embedder = match config.capabilities.build_embedder() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // The local embedder downloads model weights on first use; warm it up
    // before accepting traffic so the first indexing call doesn't pay for it.
    if config.capabilities.embedder == "local" {
        let warmup = embedder.embed_single("warmup").await;
        if let Err(e) = warmup {
            eprintln!("Embedder initialization failed: {e}");
            std::process::exit(1);
        }
    }

    let engine = Arc::new(Engine::new(extractor, embedder));

    let state = AppState {
        engine,
        config: Arc::new(config.clone()),
    };

    let app = build_router()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_seconds,
        )))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(l) => l,
        Err(e) => {
            // Bind failure before any call is a connection error, distinct
            // from mid-call failures.
            let err = EngineError::Connection(format!("failed to bind {address}: {e}"));
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    info!(
        name: "server.started",
        address = %address,
        "Server started"
    );

    if let Err(e) = axum::serve(listener, app).await {
        let err = EngineError::Connection(format!("server error: {e}"));
        eprintln!("{err}");
        std::process::exit(1);
    }
}
