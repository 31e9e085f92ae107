use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::audio::wav;

use super::{AudioResult, SynthesizeRequest, TtsEngine, TtsError};

/// Configuration for the Piper TTS engine.
#[derive(Debug, Clone)]
pub struct PiperConfig {
    /// Path to the piper executable.
    pub binary_path: String,
    /// Path to the ONNX voice model file.
    pub model_path: String,
    /// Default speaker when a request leaves the voice unset.
    pub default_voice: String,
}

/// TTS engine backed by a local Piper executable.
///
/// Piper reads UTF-8 text on stdin and, with `--output-raw`, writes raw
/// 16-bit little-endian PCM at 22 050 Hz mono on stdout. The raw stream is
/// wrapped in a canonical WAV header before it leaves the engine.
pub struct PiperEngine {
    config: PiperConfig,
}

impl PiperEngine {
    pub fn new(mut config: PiperConfig) -> Result<Self, TtsError> {
        if config.binary_path.is_empty() {
            config.binary_path = "piper".to_string();
        }
        if config.model_path.is_empty() {
            return Err(TtsError::NoModelSpecified);
        }
        Ok(Self { config })
    }

    /// Resolve the speaker argument for a request, if any.
    fn speaker_for(&self, requested: &str) -> Option<String> {
        let voice = if requested.is_empty() || requested == "default" {
            self.config.default_voice.as_str()
        } else {
            requested
        };
        if voice.is_empty() || voice == "default" {
            None
        } else {
            Some(voice.to_string())
        }
    }
}

#[async_trait]
impl TtsEngine for PiperEngine {
    fn name(&self) -> &str {
        "piper"
    }

    async fn synthesize(
        &self,
        token: &CancellationToken,
        request: SynthesizeRequest,
    ) -> Result<AudioResult, TtsError> {
        if request.text.is_empty() {
            return Err(TtsError::EmptyText);
        }

        let mut args = vec![
            "--model".to_string(),
            self.config.model_path.clone(),
            "--output-raw".to_string(),
        ];
        if let Some(speaker) = self.speaker_for(&request.voice) {
            args.push("--speaker".to_string());
            args.push(speaker);
        }

        debug!(
            binary = %self.config.binary_path,
            model = %self.config.model_path,
            text_length = request.text.len(),
            "running piper"
        );

        let mut child = Command::new(&self.config.binary_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TtsError::SynthesisFailed(e.to_string()))?;

        let mut stdin = child.stdin.take().expect("stdin piped");
        let text = request.text.clone();
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(text.as_bytes()).await;
            let _ = stdin.shutdown().await;
        });

        let output = tokio::select! {
            _ = token.cancelled() => {
                writer.abort();
                return Err(TtsError::Cancelled);
            }
            result = child.wait_with_output() => {
                let _ = writer.await;
                result.map_err(|e| TtsError::SynthesisFailed(e.to_string()))?
            }
        };

        if !output.status.success() {
            if token.is_cancelled() {
                return Err(TtsError::Cancelled);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr.trim(), "piper failed");
            return Err(TtsError::SynthesisFailed(format!(
                "exit {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let raw_audio = output.stdout;
        if raw_audio.is_empty() {
            return Err(TtsError::SynthesisFailed("no audio output".to_string()));
        }

        debug!(output_bytes = raw_audio.len(), "piper synthesis complete");

        let wav_data = wav::wrap_raw_pcm(
            &raw_audio,
            wav::PIPER_SAMPLE_RATE,
            wav::PIPER_CHANNELS,
            wav::PIPER_BITS_PER_SAMPLE,
        );

        Ok(AudioResult {
            data: wav_data,
            format: "wav".to_string(),
            sample_rate: wav::PIPER_SAMPLE_RATE,
            channels: wav::PIPER_CHANNELS,
        })
    }
}
