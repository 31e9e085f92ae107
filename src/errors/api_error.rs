use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::queue::QueueError;

/// Errors surfaced by the speak endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid JSON body")]
    InvalidJson,

    #[error("text is required")]
    TextRequired,

    #[error("text exceeds maximum length")]
    TextTooLong,

    #[error("ttl_ms must be non-negative")]
    InvalidTtl,

    #[error("queue is full")]
    QueueFull,

    #[error("duplicate job")]
    DuplicateJob,

    #[error("failed to enqueue job")]
    EnqueueFailed,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson
            | ApiError::TextRequired
            | ApiError::TextTooLong
            | ApiError::InvalidTtl => StatusCode::BAD_REQUEST,
            ApiError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DuplicateJob => StatusCode::CONFLICT,
            ApiError::EnqueueFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Full => ApiError::QueueFull,
            QueueError::Duplicate => ApiError::DuplicateJob,
            QueueError::Closed => ApiError::EnqueueFailed,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "speak request failed");
        } else {
            tracing::warn!(error = %self, "speak request rejected");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::InvalidJson.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::TextRequired.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::TextTooLong.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidTtl.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::QueueFull.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::DuplicateJob.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::EnqueueFailed.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn queue_error_mapping() {
        assert!(matches!(
            ApiError::from(QueueError::Full),
            ApiError::QueueFull
        ));
        assert!(matches!(
            ApiError::from(QueueError::Duplicate),
            ApiError::DuplicateJob
        ));
        assert!(matches!(
            ApiError::from(QueueError::Closed),
            ApiError::EnqueueFailed
        ));
    }
}
