use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::sync::Mutex;
use tokenizers::Tokenizer;

use crate::assets::ModelAssets;
use crate::normalize::{l2_normalize_in_place, masked_mean_pool};
use crate::{Embedder, EmbeddingConfig, SemanticError};

/// Sentence-transformer embedder backed by ONNX Runtime.
///
/// The session is loaded once and shared; `Session::run` needs exclusive access, so concurrent
/// callers queue on the mutex. Tokenization happens outside the lock.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    wants_token_type_ids: bool,
    model_name: String,
    dimension: usize,
    max_sequence_length: usize,
    normalize: bool,
}

struct EncodedDoc {
    ids: Vec<i64>,
    mask: Vec<i64>,
}

impl OnnxEmbedder {
    pub(crate) fn load(assets: &ModelAssets, cfg: &EmbeddingConfig) -> Result<Self, SemanticError> {
        let tokenizer = Tokenizer::from_file(&assets.tokenizer_path).map_err(|e| {
            SemanticError::Load(format!(
                "tokenizer {}: {e}",
                assets.tokenizer_path.display()
            ))
        })?;

        let session = Session::builder()
            .map_err(SemanticError::load)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(SemanticError::load)?
            .with_intra_threads(cfg.num_threads.max(1))
            .map_err(SemanticError::load)?
            .commit_from_file(&assets.model_path)
            .map_err(SemanticError::load)?;

        let wants_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let embedder = Self {
            session: Mutex::new(session),
            tokenizer,
            wants_token_type_ids,
            model_name: cfg.model_name.clone(),
            dimension: cfg.dimension,
            max_sequence_length: cfg.max_sequence_length,
            normalize: cfg.normalize,
        };

        // Probe once so a model/config dimension mismatch fails at startup, not on first request.
        let probe = embedder.encode("warm-up")?;
        if probe.len() != cfg.dimension {
            return Err(SemanticError::InvalidConfig(format!(
                "model produces {} dimensions, config expects {}",
                probe.len(),
                cfg.dimension
            )));
        }

        Ok(embedder)
    }

    fn tokenize(&self, texts: &[&str]) -> Result<(Vec<EncodedDoc>, usize), SemanticError> {
        let max = self.max_sequence_length;
        let mut encoded = Vec::with_capacity(texts.len());
        let mut seq_len = 1usize;

        for text in texts {
            let encoding = self
                .tokenizer
                .encode(*text, true)
                .map_err(SemanticError::inference)?;
            let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
            let mut mask: Vec<i64> = encoding
                .get_attention_mask()
                .iter()
                .map(|&x| x as i64)
                .collect();
            if ids.len() != mask.len() {
                return Err(SemanticError::Inference(
                    "tokenizer produced mismatched id/mask lengths".into(),
                ));
            }
            truncate_keeping_last(&mut ids, &mut mask, max);
            seq_len = seq_len.max(ids.len());
            encoded.push(EncodedDoc { ids, mask });
        }

        Ok((encoded, seq_len))
    }

    fn run(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SemanticError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let (encoded, seq_len) = self.tokenize(texts)?;
        let batch = encoded.len();
        let mut id_storage = Vec::with_capacity(batch * seq_len);
        let mut mask_storage = Vec::with_capacity(batch * seq_len);
        for EncodedDoc { ids, mask } in &encoded {
            let pad = seq_len - ids.len();
            id_storage.extend_from_slice(ids);
            id_storage.extend(std::iter::repeat_n(0, pad));
            mask_storage.extend_from_slice(mask);
            mask_storage.extend(std::iter::repeat_n(0, pad));
        }

        let shape = vec![batch, seq_len];
        let input_ids = Tensor::from_array((shape.clone(), id_storage))
            .map_err(SemanticError::inference)?;
        let attention_mask = Tensor::from_array((shape.clone(), mask_storage.clone()))
            .map_err(SemanticError::inference)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| SemanticError::Inference("onnx session lock poisoned".into()))?;
        let outputs = if self.wants_token_type_ids {
            let token_type_ids = Tensor::from_array((shape, vec![0i64; batch * seq_len]))
                .map_err(SemanticError::inference)?;
            session.run(inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids
            ])
        } else {
            session.run(inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask
            ])
        }
        .map_err(SemanticError::inference)?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| SemanticError::Inference("model returned no outputs".into()))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(SemanticError::inference)?;
        let dims: Vec<usize> = (0..shape.len()).map(|i| shape[i] as usize).collect();

        let mut vectors = match dims.as_slice() {
            // [batch, sequence, hidden]: token states, pool them.
            [b, s, hidden] if *b == batch && *s == seq_len => data
                .chunks_exact(seq_len * hidden)
                .zip(mask_storage.chunks_exact(seq_len))
                .map(|(states, mask)| masked_mean_pool(states, mask, *hidden))
                .collect::<Vec<_>>(),
            // [batch, hidden]: the graph already pooled.
            [b, hidden] if *b == batch => data
                .chunks_exact(*hidden)
                .map(<[f32]>::to_vec)
                .collect::<Vec<_>>(),
            other => {
                return Err(SemanticError::Inference(format!(
                    "unexpected model output shape {other:?} for batch {batch}x{seq_len}"
                )))
            }
        };

        if self.normalize {
            for vector in &mut vectors {
                l2_normalize_in_place(vector);
            }
        }
        Ok(vectors)
    }
}

/// Cut `ids`/`mask` to `max` tokens, keeping the trailing separator token in the last slot.
fn truncate_keeping_last(ids: &mut Vec<i64>, mask: &mut Vec<i64>, max: usize) {
    if max == 0 || ids.len() <= max {
        return;
    }
    let last = ids[ids.len() - 1];
    ids.truncate(max);
    mask.truncate(max);
    ids[max - 1] = last;
}

impl Embedder for OnnxEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, SemanticError> {
        self.run(&[text])?
            .pop()
            .ok_or_else(|| SemanticError::Inference("model returned no outputs".into()))
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SemanticError> {
        let vectors = self.run(texts)?;
        if vectors.len() != texts.len() {
            return Err(SemanticError::Inference(format!(
                "model returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}
