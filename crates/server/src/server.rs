//! Server initialization and routing
//!
//! This module handles the Axum server setup including:
//! - Router configuration with all API endpoints
//! - Middleware stack (logging, compression, CORS, timeouts, body limit)
//! - Graceful shutdown handling

use crate::config::ServerConfig;
use crate::middleware::{log_requests, request_id};
use crate::error::ServerError;
use crate::routes::{api_info, documents, health, method_not_allowed, not_found};
use crate::state::ServerState;
use crate::telemetry::install_prometheus;
use axum::error_handling::HandleErrorLayer;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::{BoxError, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes and middleware
///
/// The document routes answer both with and without the trailing slash.
///
/// Middleware stack (outermost first):
/// 1. HTTP tracing spans
/// 2. Request ID tracking
/// 3. Request logging and request metrics
/// 4. CORS
/// 5. Compression
/// 6. Timeout handling (a JSON 408 once `timeout_secs` elapses)
pub fn build_router(state: Arc<ServerState>) -> Router {
    // CORS layer
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let timeout_secs = state.config.timeout_secs;

    // Public service routes
    let service_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics));

    // Document routes
    let document_routes = Router::new()
        .route("/ingest/", post(documents::ingest_documents))
        .route("/ingest", post(documents::ingest_documents))
        .layer(DefaultBodyLimit::max(state.config.max_body_size()))
        .route("/query/", get(documents::query_documents))
        .route("/query", get(documents::query_documents))
        .route("/database/", get(documents::list_database))
        .route("/database", get(documents::list_database));

    Router::new()
        .merge(service_routes)
        .merge(document_routes)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    timeout_error(err, timeout_secs)
                }))
                .layer(TimeoutLayer::new(state.config.timeout())),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn timeout_error(err: BoxError, timeout_secs: u64) -> ServerError {
    if err.is::<Elapsed>() {
        ServerError::Timeout(timeout_secs)
    } else {
        ServerError::Internal(err.to_string())
    }
}

/// Start the docvault HTTP server
///
/// Installs JSON logging, loads the model, opens the collection and serves until SIGTERM or
/// Ctrl+C. Any initialization failure is returned and should abort the process.
///
/// # Example
///
/// ```rust,no_run
/// use server::ServerConfig;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig::load()?;
///     server::start_server(config).await?;
///     Ok(())
/// }
/// ```
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    health::mark_started();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .init();

    let prometheus = if config.metrics_enabled {
        install_prometheus()
    } else {
        None
    };

    // Create server state
    let mut state = ServerState::new(config.clone()).await?;
    if let Some(handle) = prometheus {
        state = state.with_prometheus(handle);
    }

    // Build router
    let app = build_router(Arc::new(state));

    // Parse bind address
    let addr: SocketAddr = config.socket_addr()?;

    tracing::info!(
        addr = %addr,
        model = %config.embedding.model_name,
        embedding_mode = %config.embedding.mode,
        collection = %config.store.collection,
        "Starting docvault server"
    );
    tracing::info!(
        "Timeout: {}s, Max body: {}MB, Default top_k: {}",
        config.timeout_secs,
        config.max_body_size_mb,
        config.query_top_k
    );
    tracing::info!(
        "CORS: {}, Metrics: {}",
        config.enable_cors,
        config.metrics_enabled
    );

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
