use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docvault::PipelineError;
use serde::{Deserialize, Serialize};

pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// An uploaded file is not UTF-8 text.
    #[error("Cannot decode '{0}'.")]
    Decode(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: max {0}MB allowed")]
    PayloadTooLarge(usize),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Storage(String),

    #[error("Server Error: {0}")]
    Internal(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,
}

/// API error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ServerError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Decode(_) | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::Embedding(_) | ServerError::Storage(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Map a multipart read failure, keeping the body-limit case distinct.
    pub fn from_multipart(err: MultipartError, max_body_size_mb: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge(max_body_size_mb)
        } else {
            ServerError::BadRequest(err.body_text())
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "request failed");
        } else if status != StatusCode::NOT_FOUND {
            tracing::warn!(status = %status, error = %message, "request rejected");
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<PipelineError> for ServerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Decode { filename } => ServerError::Decode(filename),
            PipelineError::Embedding(err) => ServerError::Embedding(err.to_string()),
            PipelineError::Storage(err) => ServerError::Storage(err.to_string()),
            PipelineError::InvalidQuery(msg) => ServerError::BadRequest(msg),
            PipelineError::Unknown(msg) => ServerError::Internal(msg),
        }
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ServerError {
    fn from(rejection: MultipartRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}
