use std::io;
use thiserror::Error;

/// Errors surfaced while loading an embedder or encoding text.
#[derive(Debug, Error)]
pub enum SemanticError {
    /// The ONNX model could not be located locally and no download URL was provided.
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    /// The tokenizer JSON is missing and there was no remote URL to fetch it from.
    #[error("tokenizer missing: {0}")]
    TokenizerMissing(String),
    /// Configuration is inconsistent (unknown mode, zero dimension, ...).
    #[error("invalid embedding config: {0}")]
    InvalidConfig(String),
    /// Unable to download remote assets.
    #[error("download failed: {0}")]
    Download(String),
    /// ONNX Runtime rejected the model file or the tokenizer could not be parsed.
    #[error("model load failed: {0}")]
    Load(String),
    /// Low-level IO failures while touching the filesystem.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// ONNX Runtime or tokenizer failures for a given input.
    #[error("inference failure: {0}")]
    Inference(String),
}

impl SemanticError {
    pub(crate) fn inference<E: std::fmt::Display>(err: E) -> Self {
        Self::Inference(err.to_string())
    }

    pub(crate) fn load<E: std::fmt::Display>(err: E) -> Self {
        Self::Load(err.to_string())
    }

    /// Whether the error happened while loading the model rather than while encoding.
    pub fn is_load_failure(&self) -> bool {
        !matches!(self, SemanticError::Inference(_))
    }
}
