//! The per-job playback pipeline: synthesize, transcode, attach, send.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::audio::{AudioConverter, AudioError};
use crate::queue::SpeakJob;
use crate::tts::{Registry, SynthesizeRequest, TtsError};
use crate::voice::{VoiceError, VoiceManager};

/// Errors surfaced by the playback stage machine.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("no TTS engine available")]
    NoEngine,

    #[error("playback synthesis failed: {0}")]
    Synthesis(#[source] TtsError),

    #[error("audio conversion failed: {0}")]
    Conversion(#[source] AudioError),

    #[error(transparent)]
    Voice(#[from] VoiceError),
}

impl PlaybackError {
    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            PlaybackError::Synthesis(TtsError::Cancelled)
                | PlaybackError::Conversion(AudioError::Cancelled)
                | PlaybackError::Voice(VoiceError::Cancelled)
        )
    }
}

/// Processes speech jobs: TTS, transcode, voice attach, frame-paced send.
pub struct Player {
    registry: Arc<Registry>,
    converter: Arc<AudioConverter>,
    voice: Arc<VoiceManager>,
}

impl Player {
    pub fn new(
        registry: Arc<Registry>,
        converter: Arc<AudioConverter>,
        voice: Arc<VoiceManager>,
    ) -> Self {
        Self {
            registry,
            converter,
            voice,
        }
    }

    /// Run the full pipeline for one job, honouring cancellation at every
    /// stage.
    pub async fn handle(
        &self,
        token: &CancellationToken,
        job: &SpeakJob,
    ) -> Result<(), PlaybackError> {
        info!(
            job_id = %job.id,
            text_length = job.text.len(),
            voice = %job.voice,
            "processing speech job"
        );

        // Stage 1: resolve the engine
        let engine = self
            .registry
            .default_engine()
            .map_err(|_| PlaybackError::NoEngine)?;

        // Stage 2: synthesize
        debug!(job_id = %job.id, engine = %engine.name(), "synthesizing speech");
        let audio = engine
            .synthesize(
                token,
                SynthesizeRequest {
                    text: job.text.clone(),
                    voice: job.voice.clone(),
                },
            )
            .await
            .map_err(|err| {
                error!(job_id = %job.id, error = %err, "TTS synthesis failed");
                PlaybackError::Synthesis(err)
            })?;

        debug!(
            job_id = %job.id,
            format = %audio.format,
            sample_rate = audio.sample_rate,
            channels = audio.channels,
            bytes = audio.data.len(),
            "synthesis complete"
        );

        // Stage 3: transcode to the platform's PCM
        let pcm = self
            .converter
            .convert(token, &audio.data)
            .await
            .map_err(|err| {
                error!(job_id = %job.id, error = %err, "audio conversion failed");
                PlaybackError::Conversion(err)
            })?;

        debug!(job_id = %job.id, pcm_bytes = pcm.len(), "conversion complete");

        // Stage 4: ensure voice attachment
        if !self.voice.is_attached().await {
            info!(job_id = %job.id, "connecting to voice channel");
            self.voice.connect(token).await.map_err(|err| {
                error!(job_id = %job.id, error = %err, "voice connection failed");
                PlaybackError::Voice(err)
            })?;
        }

        // Stage 5: frame-paced send
        debug!(job_id = %job.id, "sending audio to voice channel");
        if let Err(err) = self.voice.send_audio(token, &pcm).await {
            if matches!(err, VoiceError::Cancelled) {
                info!(job_id = %job.id, "playback interrupted");
            } else {
                error!(job_id = %job.id, error = %err, "audio send failed");
            }
            return Err(PlaybackError::Voice(err));
        }

        info!(job_id = %job.id, "speech playback complete");
        Ok(())
    }

    /// Adapt this player into the queue's playback handler shape.
    pub fn into_handler(self: Arc<Self>) -> crate::queue::PlaybackHandler {
        Arc::new(move |token, job| {
            let player = self.clone();
            Box::pin(async move { player.handle(&token, &job).await })
        })
    }
}
