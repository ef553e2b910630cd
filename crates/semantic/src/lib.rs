//! docvault embedding provider
//!
//! Turns text into fixed-length vectors with a pretrained sentence-transformer
//! (`all-MiniLM-L6-v2` by default, 384 dimensions). The model is loaded once at startup and
//! shared behind the [`Embedder`] trait.
//!
//! Two modes:
//!
//! - **ONNX mode** - Run the model locally through ONNX Runtime. Requires `model.onnx` and
//!   `tokenizer.json`; both are downloaded on first start when URLs are configured.
//! - **Stub mode** - Deterministic hash-derived vectors with no semantic signal. For tests and
//!   offline development.
//!
//! Unlike a best-effort embedder there is no fallback between the two: if the ONNX model cannot
//! be loaded, [`load_embedder`] fails and the caller is expected to abort.
//!
//! ## Quick example
//!
//! ```no_run
//! use semantic::{load_embedder, EmbeddingConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let embedder = load_embedder(&EmbeddingConfig::default()).await.unwrap();
//!     let vector = embedder.encode("This is a test.").unwrap();
//!     assert_eq!(vector.len(), embedder.dimension());
//! }
//! ```

pub mod config;
pub mod error;

mod assets;
mod normalize;
mod onnx;
mod stub;

pub use crate::config::EmbeddingConfig;
pub use crate::error::SemanticError;
pub use crate::onnx::OnnxEmbedder;
pub use crate::stub::StubEmbedder;

use crate::assets::resolve_model_assets;
use std::sync::Arc;

/// A loaded text-encoding model.
///
/// Implementations are deterministic for identical input and must be safe to share across
/// request handlers.
pub trait Embedder: Send + Sync {
    /// Label of the underlying model, surfaced in readiness output and logs.
    fn model_name(&self) -> &str;

    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Encode one text.
    fn encode(&self, text: &str) -> Result<Vec<f32>, SemanticError>;

    /// Encode several texts, preserving input order.
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SemanticError> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

/// Build the embedder described by `cfg`.
///
/// In ONNX mode this resolves (and if needed downloads) the model assets, creates the runtime
/// session and runs a probe encode to confirm the configured dimension.
pub async fn load_embedder(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, SemanticError> {
    cfg.validate()?;

    match cfg.mode.as_str() {
        "stub" => {
            tracing::warn!(
                dimension = cfg.dimension,
                "using stub embedder; vectors carry no semantic meaning"
            );
            Ok(Arc::new(StubEmbedder::new(cfg)))
        }
        _ => {
            let assets = resolve_model_assets(cfg).await?;
            let embedder = OnnxEmbedder::load(&assets, cfg)?;
            tracing::info!(
                model = %cfg.model_name,
                model_path = %assets.model_path.display(),
                dimension = cfg.dimension,
                "embedding model loaded"
            );
            Ok(Arc::new(embedder))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_stub_embedder() {
        let embedder = load_embedder(&EmbeddingConfig::stub()).await.unwrap();
        assert_eq!(embedder.model_name(), "stub");
        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.encode("hello").unwrap().len(), 384);
    }

    #[tokio::test]
    async fn onnx_mode_without_assets_fails_instead_of_falling_back() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EmbeddingConfig {
            model_path: dir.path().join("missing.onnx"),
            tokenizer_path: dir.path().join("missing.json"),
            ..Default::default()
        };

        let err = match load_embedder(&cfg).await {
            Ok(_) => panic!("loading must fail without model files"),
            Err(err) => err,
        };
        assert!(matches!(err, SemanticError::ModelNotFound(_)));
        assert!(err.is_load_failure());
    }

    #[tokio::test]
    async fn corrupt_tokenizer_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.onnx");
        let tokenizer_path = dir.path().join("tokenizer.json");
        std::fs::write(&model_path, b"garbage").unwrap();
        std::fs::write(&tokenizer_path, b"not json").unwrap();
        let cfg = EmbeddingConfig {
            model_path,
            tokenizer_path,
            ..Default::default()
        };

        let err = match load_embedder(&cfg).await {
            Ok(_) => panic!("corrupt assets must not load"),
            Err(err) => err,
        };
        assert!(matches!(err, SemanticError::Load(_)));
    }

    #[tokio::test]
    async fn invalid_mode_is_rejected() {
        let cfg = EmbeddingConfig {
            mode: "remote".into(),
            ..Default::default()
        };
        assert!(matches!(
            load_embedder(&cfg).await,
            Err(SemanticError::InvalidConfig(_))
        ));
    }
}
