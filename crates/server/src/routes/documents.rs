use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::Json;
use docvault::{DocumentSummary, Match, UploadedFile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Status message returned by a successful ingest.
pub const INGEST_SUCCESS: &str = "Documents ingested successfully";

/// Response from ingesting a batch of files
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
}

/// Query string of `GET /query/`
#[derive(Debug, Deserialize)]
pub struct QueryParams {
    /// Text to search for
    pub search_text: String,

    /// Number of results (defaults to the configured `query_top_k`)
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Similarity query response
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: Vec<Match>,
}

/// Collection listing response
#[derive(Debug, Serialize)]
pub struct DatabaseResponse {
    pub documents: Vec<DocumentSummary>,
}

/// Ingest uploaded files.
///
/// Every multipart part with a non-empty filename is one document; other form fields are
/// ignored. The batch is all-or-nothing: a single undecodable file fails the request with 400
/// and nothing is stored.
///
/// # Example
/// ```text
/// curl -F "files=@notes.txt" -F "files=@todo.md" http://localhost:8000/ingest/
/// {"status":"Documents ingested successfully"}
/// ```
pub async fn ingest_documents(
    State(state): State<Arc<ServerState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<Json<IngestResponse>> {
    let mut multipart = multipart?;
    let max_body_size_mb = state.config.max_body_size_mb;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServerError::from_multipart(err, max_body_size_mb))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            tracing::debug!(field = ?field.name(), "skipping non-file form field");
            continue;
        };
        // Browsers send an empty filename for a file input left blank.
        if filename.is_empty() {
            tracing::debug!(field = ?field.name(), "skipping file field without a file");
            continue;
        }
        let content = field
            .bytes()
            .await
            .map_err(|err| ServerError::from_multipart(err, max_body_size_mb))?;
        files.push(UploadedFile::new(filename, content.to_vec()));
    }

    if files.is_empty() {
        return Err(ServerError::BadRequest(
            "no files in multipart body".to_string(),
        ));
    }

    state.pipeline.ingest(files).await?;
    Ok(Json(IngestResponse {
        status: INGEST_SUCCESS.to_string(),
    }))
}

/// Return the stored documents nearest to `search_text`, closest first.
///
/// # Example
/// ```text
/// GET /query/?search_text=green%20tea
/// {"results":[{"filename":"tea.txt","score":0.41,"text":"..."}]}
/// ```
pub async fn query_documents(
    State(state): State<Arc<ServerState>>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> ServerResult<Json<QueryResponse>> {
    let Query(params) = params?;
    let top_k = params.top_k.unwrap_or(state.config.query_top_k);

    let results = state.pipeline.query(&params.search_text, top_k).await?;
    Ok(Json(QueryResponse { results }))
}

/// Dump every stored document as `{filename, text}`.
pub async fn list_database(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<Json<DatabaseResponse>> {
    let documents = state.pipeline.list_all().await?;
    Ok(Json(DatabaseResponse { documents }))
}
