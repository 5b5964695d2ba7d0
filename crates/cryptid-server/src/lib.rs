//! Cryptid server library logic.

pub mod api_sightings;
pub mod api_ws;
pub mod bridge;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Extension, Json, Router,
};
use cryptid_broker::TopicBroker;
use cryptid_store::SightingStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The sighting store (owns the database pool and the change feed).
    pub store: Arc<SightingStore>,
    /// Topic broker for WebSocket subscribers.
    pub broker: TopicBroker,
}

/// Maximum request body size (256 KiB). Sighting payloads are small; this
/// protects against oversized requests.
const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sightings", axum::routing::post(api_sightings::create_sighting_handler))
        .route(
            "/sightings/{state}",
            get(api_sightings::list_sightings_handler),
        )
        .route(
            "/sighting/{id}",
            get(api_sightings::get_sighting_handler)
                .put(api_sightings::update_sighting_handler)
                .delete(api_sightings::delete_sighting_handler),
        )
        .route("/ws", get(api_ws::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
