use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Authentication error types for the ingress API.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Authorization header is missing from the request.
    #[error("missing authorization header")]
    MissingAuthHeader,

    /// Authorization header is not of the form `Bearer <token>`.
    #[error("invalid authorization format")]
    InvalidAuthHeader,

    /// The presented token does not match the configured one.
    #[error("invalid token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "request rejected by auth");

        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
