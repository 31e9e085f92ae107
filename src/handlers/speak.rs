use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::api_error::{ApiError, ApiResult};
use crate::queue::SpeakJob;
use crate::state::AppState;

/// Request body for `POST /v1/speak`.
#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub voice: String,
    #[serde(default)]
    pub interrupt: bool,
    #[serde(default)]
    pub ttl_ms: i64,
    #[serde(default)]
    pub dedupe_key: String,
}

/// Response body for an accepted speak request.
#[derive(Debug, Serialize)]
pub struct SpeakResponse {
    pub job_id: String,
    pub message: String,
}

/// Handler for `POST /v1/speak`.
///
/// Validates the payload, applies voice and TTL defaults, honours the
/// interrupt flag before enqueueing, and maps queue outcomes to statuses.
/// The body is parsed by hand so malformed JSON gets a uniform error shape.
pub async fn speak(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SpeakResponse>)> {
    let request: SpeakRequest = serde_json::from_slice(&body).map_err(|err| {
        warn!(error = %err, "failed to decode speak request");
        ApiError::InvalidJson
    })?;

    if request.text.is_empty() {
        return Err(ApiError::TextRequired);
    }
    if request.text.len() > state.config.max_text_length {
        warn!(
            length = request.text.len(),
            max = state.config.max_text_length,
            "text exceeds max length"
        );
        return Err(ApiError::TextTooLong);
    }
    if request.ttl_ms < 0 {
        return Err(ApiError::InvalidTtl);
    }

    let voice = if request.voice.is_empty() {
        state.config.default_voice.clone()
    } else {
        request.voice.clone()
    };

    let ttl = if request.ttl_ms > 0 {
        Duration::from_millis(request.ttl_ms as u64)
    } else {
        state.config.default_ttl
    };

    // Interrupt cancels the current playback and clears the queue before the
    // new job goes in
    if request.interrupt {
        state.queue.interrupt();
    }

    let job = SpeakJob::new(
        request.text.clone(),
        voice.clone(),
        request.interrupt,
        ttl,
        request.dedupe_key.clone(),
    );
    let job_id = job.id.clone();

    state.queue.enqueue(job)?;

    info!(
        job_id = %job_id,
        text_length = request.text.len(),
        voice = %voice,
        interrupt = request.interrupt,
        ttl_ms = request.ttl_ms,
        dedupe_key = %request.dedupe_key,
        "speak request enqueued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SpeakResponse {
            job_id,
            message: "job enqueued".to_string(),
        }),
    ))
}
