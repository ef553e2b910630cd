use index::StoreConfig;
use semantic::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level (an `EnvFilter` directive)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics endpoint enabled
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Number of results a query returns when `top_k` is not given
    #[serde(default = "default_query_top_k")]
    pub query_top_k: usize,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Document collection settings
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            query_top_k: default_query_top_k(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `docvault.{toml,yaml,json}` file and
    /// `DOCVAULT__*` environment variables, later sources winning.
    pub fn load() -> anyhow::Result<Self> {
        // A missing .env is fine
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("docvault").required(false))
            // Override with environment variables
            .add_source(config::Environment::with_prefix("DOCVAULT").separator("__"));

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.query_top_k == 0 {
            anyhow::bail!("query_top_k must be at least 1");
        }
        if self.max_body_size_mb == 0 {
            anyhow::bail!("max_body_size_mb must be at least 1");
        }
        self.embedding.validate()?;
        Ok(())
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_body_size_mb() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_query_top_k() -> usize {
    5
}
