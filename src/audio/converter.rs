use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{VOICE_CHANNELS, VOICE_SAMPLE_RATE};

/// Errors produced by the audio converter.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("transcoder not found: {0}")]
    TranscoderNotFound(String),

    #[error("empty input data")]
    EmptyInput,

    #[error("audio conversion failed: {0}")]
    ConversionFailed(String),

    #[error("audio conversion cancelled")]
    Cancelled,

    #[error("transcoder I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Drives an external ffmpeg process to convert arbitrary WAV input into the
/// voice platform's canonical raw PCM (48 kHz, stereo, s16le).
pub struct AudioConverter {
    ffmpeg_path: String,
}

impl AudioConverter {
    /// Create a converter using `ffmpeg` from PATH, probing that the binary
    /// actually runs.
    pub async fn new() -> Result<Self, AudioError> {
        Self::with_path("ffmpeg").await
    }

    /// Create a converter for a specific executable, probing availability.
    pub async fn with_path(path: &str) -> Result<Self, AudioError> {
        let probe = Command::new(path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match probe {
            Ok(status) if status.success() => Ok(Self {
                ffmpeg_path: path.to_string(),
            }),
            _ => Err(AudioError::TranscoderNotFound(path.to_string())),
        }
    }

    /// Create a converter without probing the executable.
    pub fn with_path_unchecked(path: &str) -> Self {
        Self {
            ffmpeg_path: path.to_string(),
        }
    }

    /// Convert WAV bytes to voice-ready raw PCM.
    ///
    /// Input: a WAV file at any sample rate, mono or stereo. Output: raw
    /// 16-bit signed little-endian PCM at 48 kHz stereo. The transcoder
    /// process lives no longer than `token`.
    pub async fn convert(
        &self,
        token: &CancellationToken,
        wav_data: &[u8],
    ) -> Result<Vec<u8>, AudioError> {
        if wav_data.is_empty() {
            return Err(AudioError::EmptyInput);
        }

        let sample_rate = VOICE_SAMPLE_RATE.to_string();
        let channels = VOICE_CHANNELS.to_string();
        let mut child = Command::new(&self.ffmpeg_path)
            .args([
                "-f",
                "wav",
                "-i",
                "pipe:0",
                "-ar",
                sample_rate.as_str(),
                "-ac",
                channels.as_str(),
                "-f",
                "s16le",
                "-loglevel",
                "error",
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin from a separate task so a full stdout pipe can never
        // deadlock against our write.
        let mut stdin = child.stdin.take().expect("stdin piped");
        let input = wav_data.to_vec();
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        });

        let output = tokio::select! {
            _ = token.cancelled() => {
                writer.abort();
                return Err(AudioError::Cancelled);
            }
            result = child.wait_with_output() => {
                let _ = writer.await;
                result?
            }
        };

        if !output.status.success() {
            if token.is_cancelled() {
                return Err(AudioError::Cancelled);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AudioError::ConversionFailed(stderr.trim().to_string()));
        }

        debug!(
            input_bytes = wav_data.len(),
            output_bytes = output.stdout.len(),
            "audio conversion complete"
        );

        Ok(output.stdout)
    }
}
