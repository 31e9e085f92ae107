use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::RelayConfig;

/// Timeout for forward requests to the announcer API.
const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// How much of an error response body to keep for diagnostics.
const BODY_SNIPPET_LIMIT: usize = 1024;

/// Reconnect backoff bounds.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Relay error types.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("unexpected status {status}: {body}")]
    StreamStatus { status: StatusCode, body: String },

    #[error("forward failed with status {status}: {body}")]
    ForwardStatus { status: StatusCode, body: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// One object from the ntfy JSON stream.
#[derive(Debug, Deserialize)]
pub struct NtfyMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

/// Request body for the announcer's speak endpoint.
#[derive(Debug, Serialize)]
struct ForwardRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    interrupt: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    dedupe_key: &'a str,
}

/// Subscribes to ntfy topics and forwards message events to the announcer.
pub struct RelayClient {
    config: RelayConfig,
    /// Client for forward requests, bounded by a timeout.
    http: reqwest::Client,
    /// Client for long-lived streaming subscriptions, no timeout.
    stream_http: reqwest::Client,
    /// fingerprint -> first seen
    dedupe: parking_lot::Mutex<HashMap<String, Instant>>,
}

impl RelayClient {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        Ok(Self {
            config,
            http: reqwest::Client::builder()
                .timeout(FORWARD_TIMEOUT)
                .build()?,
            stream_http: reqwest::Client::new(),
            dedupe: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Run the relay: one subscription loop per topic plus the dedupe
    /// sweeper. Blocks until `token` is cancelled and every task has been
    /// joined.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut tasks = Vec::new();

        for topic in self.config.ntfy_topics.clone() {
            let client = self.clone();
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                client.subscribe_loop(&token, &topic).await;
            }));
        }

        if self.config.dedupe_window > Duration::ZERO {
            let client = self.clone();
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                client.sweep_loop(&token).await;
            }));
        }

        for task in tasks {
            let _ = task.await;
        }
    }

    /// Subscribe to one topic forever, reconnecting with exponential backoff.
    async fn subscribe_loop(&self, token: &CancellationToken, topic: &str) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if token.is_cancelled() {
                return;
            }

            info!(topic, server = %self.config.ntfy_server, "subscribing to ntfy topic");

            if let Err(err) = self.subscribe(token, topic).await {
                if token.is_cancelled() {
                    return;
                }
                warn!(
                    topic,
                    error = %err,
                    backoff = ?backoff,
                    "subscription error, reconnecting"
                );
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }

            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// One streaming connection: read newline-delimited JSON objects and
    /// handle message events until the stream ends or errors.
    async fn subscribe(&self, token: &CancellationToken, topic: &str) -> Result<(), RelayError> {
        let url = format!(
            "{}/{}/json",
            self.config.ntfy_server.trim_end_matches('/'),
            topic
        );

        let response = self.stream_http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = limited_body(response).await;
            return Err(RelayError::StreamStatus { status, body });
        }

        info!(topic, "connected to ntfy stream");

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                        self.drain_lines(&mut buffer, topic).await;
                    }
                    Some(Err(err)) => return Err(RelayError::Http(err)),
                    // Server closed the stream; the caller reconnects
                    None => return Ok(()),
                }
            }
        }
    }

    /// Process every complete line currently in the buffer.
    async fn drain_lines(&self, buffer: &mut Vec<u8>, topic: &str) {
        while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }

            let message: NtfyMessage = match serde_json::from_slice(line) {
                Ok(message) => message,
                Err(err) => {
                    warn!(
                        error = %err,
                        line = %String::from_utf8_lossy(line),
                        "failed to parse ntfy message"
                    );
                    continue;
                }
            };

            // Keepalive, open, poll_request and friends are not spoken
            if message.event != "message" {
                debug!(event = %message.event, topic, "skipping non-message event");
                continue;
            }

            self.handle_message(message).await;
        }
    }

    async fn handle_message(&self, message: NtfyMessage) {
        debug!(
            id = %message.id,
            topic = %message.topic,
            title = %message.title,
            message = %message.message,
            "received ntfy message"
        );

        let text = self.format_text(&message.title, &message.message);
        if text.is_empty() {
            debug!(id = %message.id, "skipping empty message");
            return;
        }

        let mut dedupe_key = String::new();
        if self.config.dedupe_window > Duration::ZERO {
            dedupe_key = fingerprint(&text);
            if self.is_duplicate(&dedupe_key) {
                debug!(id = %message.id, dedupe_key = %dedupe_key, "skipping duplicate message");
                return;
            }
            self.record(&dedupe_key);
        }

        if let Err(err) = self.forward(&text, &dedupe_key).await {
            error!(
                error = %err,
                ntfy_id = %message.id,
                text_length = text.len(),
                "failed to forward message"
            );
            return;
        }

        info!(
            ntfy_id = %message.id,
            topic = %message.topic,
            text_length = text.len(),
            interrupt = self.config.interrupt,
            "forwarded message"
        );
    }

    /// Join prefix, title and message with ": ", dropping empty parts, and
    /// truncate to the configured maximum.
    pub fn format_text(&self, title: &str, message: &str) -> String {
        let parts: Vec<&str> = [self.config.prefix.as_str(), title, message]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect();

        let mut text = parts.join(": ");

        if text.len() > self.config.max_text_length {
            let mut end = self.config.max_text_length;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }

        text
    }

    /// POST the text to the announcer's speak endpoint.
    async fn forward(&self, text: &str, dedupe_key: &str) -> Result<(), RelayError> {
        let url = format!("{}/v1/speak", self.config.api_url.trim_end_matches('/'));

        let mut request = self.http.post(&url).json(&ForwardRequest {
            text,
            interrupt: self.config.interrupt,
            dedupe_key,
        });
        if !self.config.bearer_token.is_empty() {
            request = request.bearer_auth(&self.config.bearer_token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = limited_body(response).await;
            return Err(RelayError::ForwardStatus { status, body });
        }

        Ok(())
    }

    fn is_duplicate(&self, key: &str) -> bool {
        match self.dedupe.lock().get(key) {
            Some(seen_at) => seen_at.elapsed() < self.config.dedupe_window,
            None => false,
        }
    }

    fn record(&self, key: &str) {
        self.dedupe.lock().insert(key.to_string(), Instant::now());
    }

    /// Periodically drop dedupe entries older than the window.
    async fn sweep_loop(&self, token: &CancellationToken) {
        let period = self.config.dedupe_window;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => self.sweep(),
            }
        }
    }

    fn sweep(&self) {
        let window = self.config.dedupe_window;
        self.dedupe
            .lock()
            .retain(|_, seen_at| seen_at.elapsed() < window);
    }

    #[cfg(test)]
    fn dedupe_len(&self) -> usize {
        self.dedupe.lock().len()
    }
}

/// Short hex fingerprint of the forwarded text.
fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Read at most a snippet of a response body for diagnostics.
async fn limited_body(response: reqwest::Response) -> String {
    let mut stream = response.bytes_stream();
    let mut buffer = Vec::new();

    while let Some(Ok(chunk)) = stream.next().await {
        buffer.extend_from_slice(&chunk);
        if buffer.len() >= BODY_SNIPPET_LIMIT {
            buffer.truncate(BODY_SNIPPET_LIMIT);
            break;
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}
