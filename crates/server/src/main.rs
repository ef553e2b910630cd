//! docvault Server - HTTP REST API for document ingestion and semantic search
//!
//! Loads the embedding model and opens the document collection at startup; either failing
//! aborts the process.

use server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::load()?;

    // Start server
    server::start_server(config).await?;

    Ok(())
}
