//! HTTP Surface
//!
//! Thin axum JSON routes over the engine's session-scoped operations.

pub mod routes;

pub use routes::build_router;
