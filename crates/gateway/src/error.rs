use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inference::InferenceError;
use preprocess::DecodeError;
use serde_json::json;
use thiserror::Error;

/// Per-request failures. Caller mistakes map to 400, faults on our side to
/// 500; none of them are retried.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request is missing the `image` field")]
    MissingInput,

    #[error("could not read multipart payload: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("could not persist upload: {0}")]
    Storage(#[from] std::io::Error),

    #[error("classification task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingInput | ApiError::Multipart(_) | ApiError::Decode(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Inference(_) | ApiError::Storage(_) | ApiError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Rejected request");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
