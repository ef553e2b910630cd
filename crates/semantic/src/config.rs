use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime configuration describing which model/tokenizer to load and how to post-process vectors.
///
/// # Example
/// ```no_run
/// use semantic::{load_embedder, EmbeddingConfig};
///
/// # async fn run() -> Result<(), semantic::SemanticError> {
/// let cfg = EmbeddingConfig {
///     model_url: Some("https://huggingface.co/Xenova/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx".into()),
///     tokenizer_url: Some("https://huggingface.co/Xenova/all-MiniLM-L6-v2/resolve/main/tokenizer.json".into()),
///     ..Default::default()
/// };
///
/// let embedder = load_embedder(&cfg).await?;
/// let vector = embedder.encode("This is a test.")?;
/// assert_eq!(vector.len(), 384);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Inference mode selector: `"onnx"` (local model) or `"stub"` (deterministic hash vectors).
    pub mode: String,
    /// Friendly label reported by the embedder.
    pub model_name: String,
    /// Local path of the ONNX file (also the download target when [`model_url`](Self::model_url) is set).
    pub model_path: PathBuf,
    /// Optional HTTPS URL downloaded when [`model_path`](Self::model_path) is missing.
    pub model_url: Option<String>,
    /// Path to `tokenizer.json`.
    pub tokenizer_path: PathBuf,
    /// Optional HTTPS URL for fetching the tokenizer on demand.
    pub tokenizer_url: Option<String>,
    /// Output dimension. Checked against the model's output on the first encode.
    pub dimension: usize,
    /// Token budget per input; longer inputs are truncated.
    pub max_sequence_length: usize,
    /// Normalize the resulting vector to unit length.
    pub normalize: bool,
    /// Intra-op threads handed to ONNX Runtime.
    pub num_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: "onnx".into(),
            model_name: "all-MiniLM-L6-v2".into(),
            model_path: PathBuf::from("./models/all-MiniLM-L6-v2/onnx/model.onnx"),
            model_url: None,
            tokenizer_path: PathBuf::from("./models/all-MiniLM-L6-v2/tokenizer.json"),
            tokenizer_url: None,
            dimension: 384,
            max_sequence_length: 256,
            normalize: true,
            num_threads: 4,
        }
    }
}

impl EmbeddingConfig {
    /// Config for the deterministic stub embedder (tests, offline development).
    pub fn stub() -> Self {
        Self {
            mode: "stub".into(),
            model_name: "stub".into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), crate::SemanticError> {
        if self.dimension == 0 {
            return Err(crate::SemanticError::InvalidConfig(
                "dimension must be positive".into(),
            ));
        }
        if self.max_sequence_length == 0 {
            return Err(crate::SemanticError::InvalidConfig(
                "max_sequence_length must be positive".into(),
            ));
        }
        match self.mode.as_str() {
            "onnx" | "stub" => Ok(()),
            other => Err(crate::SemanticError::InvalidConfig(format!(
                "unknown mode '{other}'"
            ))),
        }
    }
}
