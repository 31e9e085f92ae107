use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, speak};
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

/// Bound on how long one ingress request may take end to end.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the ingress router: a public health check plus the authenticated
/// speak endpoint.
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/v1/speak", post(speak::speak))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/v1/healthz", get(health::healthz))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}
