//! API route handlers
//!
//! Routes are organized by functionality:
//!
//! - `documents`: ingest, similarity query and collection listing
//! - `health`: Health checks, readiness, and metrics

pub mod documents;
pub mod health;

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// API version and base info
///
/// # Response
///
/// ```json
/// {
///   "name": "docvault",
///   "version": "0.1.0",
///   "model": "all-MiniLM-L6-v2",
///   "collection": "document_store",
///   "endpoints": ["..."]
/// }
/// ```
pub async fn api_info(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "docvault",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.pipeline.embedder().model_name(),
        "collection": state.pipeline.store().collection(),
        "endpoints": [
            "POST /ingest/",
            "GET /query/?search_text=...",
            "GET /database/",
            "GET /health",
            "GET /ready",
            "GET /metrics"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}

/// 405 handler for known paths hit with the wrong method
pub async fn method_not_allowed() -> ServerError {
    ServerError::MethodNotAllowed
}
