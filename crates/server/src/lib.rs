//! docvault Server - HTTP REST API for document ingestion and semantic search
//!
//! This crate exposes the docvault pipelines over HTTP:
//!
//! - **Ingestion**: multipart upload of text files, embedded and stored in one batch
//! - **Search**: nearest documents to a query text
//! - **Listing**: every stored document
//! - **Health & Metrics**: Liveness/readiness probes and Prometheus-compatible metrics
//!
//! # Features
//!
//! - **Middleware**: Compression, CORS, request ID tracking, structured logging
//! - **Configuration**: Environment variable and file-based configuration
//! - **Error Handling**: Flat `{"error": "..."}` bodies with meaningful status codes
//! - **Graceful Shutdown**: Proper signal handling for production deployments
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `POST /ingest/` - Upload files (multipart); every part with a filename is a document
//! - `GET /query/?search_text=<text>[&top_k=<n>]` - Top matches, closest first
//! - `GET /database/` - Every stored document
//! - `GET /` - API information
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use crate::config::ServerConfig;
pub use crate::error::{ServerError, ServerResult};
pub use crate::server::{build_router, start_server};
pub use crate::state::ServerState;
