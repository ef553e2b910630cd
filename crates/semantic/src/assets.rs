use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{EmbeddingConfig, SemanticError};

#[derive(Debug)]
pub(crate) struct ModelAssets {
    pub(crate) model_path: PathBuf,
    pub(crate) tokenizer_path: PathBuf,
}

/// Ensures that the model and tokenizer exist locally, downloading them when URLs are provided.
pub(crate) async fn resolve_model_assets(
    cfg: &EmbeddingConfig,
) -> Result<ModelAssets, SemanticError> {
    let model_path = ensure_local_file(&cfg.model_path, cfg.model_url.as_deref(), || {
        SemanticError::ModelNotFound(cfg.model_path.display().to_string())
    })
    .await?;

    let tokenizer_path =
        ensure_local_file(&cfg.tokenizer_path, cfg.tokenizer_url.as_deref(), || {
            SemanticError::TokenizerMissing(cfg.tokenizer_path.display().to_string())
        })
        .await?;

    Ok(ModelAssets {
        model_path,
        tokenizer_path,
    })
}

/// Returns `target` if it already exists, otherwise attempts to download `remote_url`.
async fn ensure_local_file<F>(
    target: &Path,
    remote_url: Option<&str>,
    on_missing: F,
) -> Result<PathBuf, SemanticError>
where
    F: FnOnce() -> SemanticError,
{
    if target.exists() {
        return Ok(target.to_path_buf());
    }

    if let Some(url) = remote_url {
        tracing::info!(url, target = %target.display(), "downloading model asset");
        download_to_path(target, url).await?;
        return Ok(target.to_path_buf());
    }

    Err(on_missing())
}

/// Downloads `url` into `target`, creating parent directories as needed.
async fn download_to_path(target: &Path, url: &str) -> Result<(), SemanticError> {
    if let Some(parent) = target.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let response = reqwest::get(url)
        .await
        .map_err(|e| SemanticError::Download(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SemanticError::Download(format!(
            "unexpected status {status} while fetching {url}"
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SemanticError::Download(e.to_string()))?;

    // Write next to the target first so a dropped connection never leaves a truncated model.
    let partial = target.with_extension("partial");
    fs::write(&partial, &bytes)?;
    fs::rename(&partial, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_model_without_url_is_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EmbeddingConfig {
            model_path: dir.path().join("model.onnx"),
            tokenizer_path: dir.path().join("tokenizer.json"),
            ..Default::default()
        };

        let err = resolve_model_assets(&cfg).await.unwrap_err();
        assert!(matches!(err, SemanticError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn missing_tokenizer_without_url_is_tokenizer_missing() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.onnx");
        fs::write(&model_path, b"not really onnx").unwrap();
        let cfg = EmbeddingConfig {
            model_path: model_path.clone(),
            tokenizer_path: dir.path().join("tokenizer.json"),
            ..Default::default()
        };

        let err = resolve_model_assets(&cfg).await.unwrap_err();
        assert!(matches!(err, SemanticError::TokenizerMissing(_)));
    }

    #[tokio::test]
    async fn existing_files_resolve_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.onnx");
        let tokenizer_path = dir.path().join("tokenizer.json");
        fs::write(&model_path, b"m").unwrap();
        fs::write(&tokenizer_path, b"{}").unwrap();
        let cfg = EmbeddingConfig {
            model_path: model_path.clone(),
            tokenizer_path: tokenizer_path.clone(),
            // Would fail if a download were attempted.
            model_url: Some("http://127.0.0.1:9/model.onnx".into()),
            ..Default::default()
        };

        let assets = resolve_model_assets(&cfg).await.unwrap();
        assert_eq!(assets.model_path, model_path);
        assert_eq!(assets.tokenizer_path, tokenizer_path);
    }
}
