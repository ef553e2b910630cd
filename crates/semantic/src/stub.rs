use fxhash::hash64;

use crate::normalize::l2_normalize_in_place;
use crate::{Embedder, EmbeddingConfig, SemanticError};

/// Deterministic embedder selected with `mode = "stub"`.
///
/// Each component is derived from a hash of the input text and its position, so identical text
/// always maps to the identical vector and distinct texts almost surely map to distinct ones.
/// There is no semantic signal; it exists so the rest of the system can run without model files.
pub struct StubEmbedder {
    model_name: String,
    dimension: usize,
    normalize: bool,
}

impl StubEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> Self {
        Self {
            model_name: cfg.model_name.clone(),
            dimension: cfg.dimension,
            normalize: cfg.normalize,
        }
    }
}

impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, SemanticError> {
        let h = hash64(text.as_bytes());
        let mut v: Vec<f32> = (0..self.dimension)
            .map(|idx| {
                let bits = hash64(&(h, idx as u64)) >> 40;
                (bits as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
            })
            .collect();
        if self.normalize {
            l2_normalize_in_place(&mut v);
        }
        Ok(v)
    }
}
