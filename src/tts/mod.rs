//! Text-to-speech engines.
//!
//! An engine turns an utterance into audio bytes; the registry holds the
//! engines available to the playback pipeline, with one default slot.

pub mod piper;
pub mod registry;

pub use piper::{PiperConfig, PiperEngine};
pub use registry::Registry;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Parameters for a single synthesis call.
#[derive(Debug, Clone)]
pub struct SynthesizeRequest {
    /// The utterance to speak.
    pub text: String,
    /// Speaker/voice selector; empty means the engine default.
    pub voice: String,
}

/// Synthesized audio.
#[derive(Debug, Clone)]
pub struct AudioResult {
    /// Audio bytes (WAV container).
    pub data: Vec<u8>,
    /// Container format, e.g. "wav".
    pub format: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u16,
}

/// TTS error types.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("empty text")]
    EmptyText,

    #[error("TTS synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("TTS synthesis cancelled")]
    Cancelled,

    #[error("TTS engine not found")]
    EngineNotFound,

    #[error("TTS engine already registered")]
    EngineExists,

    #[error("no piper model specified")]
    NoModelSpecified,
}

/// A text-to-speech engine.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Engine identifier used for registry lookups.
    fn name(&self) -> &str;

    /// Convert text to audio. The engine must stop work promptly when
    /// `token` is cancelled and report [`TtsError::Cancelled`].
    async fn synthesize(
        &self,
        token: &CancellationToken,
        request: SynthesizeRequest,
    ) -> Result<AudioResult, TtsError>;
}
