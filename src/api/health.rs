//! Health check and API index endpoints

use axum::{Json, Router, routing::get};
use indexmap::IndexMap;
use serde::Serialize;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// API index response
#[derive(Serialize)]
pub struct IndexResponse {
    pub message: &'static str,
    pub endpoints: IndexMap<&'static str, &'static str>,
}

const ENDPOINTS: [(&str, &str); 7] = [
    ("/start_story", "Start a new story"),
    ("/next_scene", "Get the next scene based on choice"),
    ("/voice_input", "Process voice input"),
    ("/save_progress", "Save user progress"),
    ("/get_state", "Get user state"),
    ("/test_audio", "Synthesize a demo clip"),
    ("/audio/{file}", "Fetch a generated audio file"),
];

/// Build health router
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api", get(index))
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Welcome message and endpoint list
async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: "Welcome to the Interactive Audio Quest API",
        endpoints: ENDPOINTS.into_iter().collect(),
    })
}
