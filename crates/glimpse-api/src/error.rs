use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use glimpse_core::StoryError;
use thiserror::Error;
use tracing::error;

/// Handler error. Maps onto a status code and a `{"error": ...}` body;
/// internal causes are logged and never sent to the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Story(#[from] StoryError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Story(StoryError::NotFound) => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Story(StoryError::Forbidden) => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::Story(StoryError::InvalidRequest(msg)) | ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Story(StoryError::RateLimited) => {
                (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".to_string())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Story(StoryError::Store(e)) | ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
