use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::errors::auth_error::AuthError;
use crate::state::AppState;

/// Bearer-token authentication middleware for the speak endpoint.
///
/// When no token is configured, authentication is disabled and requests pass
/// straight through (the server warns about this once at startup). The
/// scheme comparison is case-insensitive and the token comparison is
/// constant-time.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if state.config.auth_disabled() {
        debug!("bearer authentication disabled, skipping");
        return Ok(next.run(request).await);
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let (scheme, token) = header_value
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let expected = state.config.bearer_token.as_bytes();
    if !bool::from(token.as_bytes().ct_eq(expected)) {
        warn!(path = %request.uri().path(), "invalid bearer token");
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}
