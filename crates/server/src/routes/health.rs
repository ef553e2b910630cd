use crate::error::{ServerError, ServerResult};
use crate::state::{ServerMetadata, ServerState};
use once_cell::sync::Lazy;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

/// Global server start time for uptime calculation
static SERVER_START_TIME: Lazy<SystemTime> = Lazy::new(SystemTime::now);

/// Pin the uptime clock to now. Called once at startup.
pub fn mark_started() {
    Lazy::force(&SERVER_START_TIME);
}

fn uptime_seconds() -> u64 {
    SERVER_START_TIME
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Health check endpoint (liveness)
/// Returns 200 if server is running
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "docvault-server",
        timestamp: chrono::Utc::now().to_rfc3339(),
        metadata: ServerMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime_seconds(),
        },
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    timestamp: String,
    #[serde(flatten)]
    metadata: ServerMetadata,
}

/// Readiness check endpoint
/// Returns 200 once the model is loaded and the collection answers
pub async fn readiness_check(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let store = state.pipeline.store();
    let embedder = state.pipeline.embedder();
    let documents = store
        .count()
        .map_err(|err| ServerError::Storage(err.to_string()))?;

    Ok(Json(json!({
        "status": "ready",
        "service": "docvault-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
        "components": {
            "model": {
                "name": embedder.model_name(),
                "dimension": embedder.dimension(),
            },
            "store": {
                "collection": store.collection(),
                "documents": documents,
            },
        }
    })))
}

/// Prometheus metrics endpoint
///
/// Renders the Prometheus text exposition when a recorder is installed, otherwise a small JSON
/// document with the uptime.
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<Response> {
    if !state.config.metrics_enabled {
        return Err(ServerError::NotFound);
    }

    match &state.prometheus {
        Some(handle) => Ok((
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response()),
        None => Ok(Json(json!({ "uptime_seconds": uptime_seconds() })).into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_started_pins_the_clock() {
        mark_started();
        let pinned = Lazy::get(&SERVER_START_TIME).copied();
        assert!(pinned.is_some());

        mark_started();
        assert_eq!(Lazy::get(&SERVER_START_TIME).copied(), pinned);
    }
}
