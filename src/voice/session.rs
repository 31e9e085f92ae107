use std::sync::Arc;

use async_trait::async_trait;

/// Voice attachment error types.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("not connected to voice channel")]
    NotAttached,

    #[error("failed to connect to voice channel: {0}")]
    ConnectionFailed(String),

    #[error("failed to set speaking state: {0}")]
    SpeakingFailed(String),

    #[error("opus encoding failed: {0}")]
    Encoding(String),

    #[error("voice session error: {0}")]
    Session(String),

    #[error("voice playback cancelled")]
    Cancelled,
}

/// The long-lived platform session consumed by the voice manager.
///
/// Implementations wrap the external voice-platform library; the rest of the
/// crate only ever talks to these traits.
#[async_trait]
pub trait VoiceSession: Send + Sync {
    /// Open the underlying session (websocket, identify, ...).
    async fn open(&self) -> Result<(), VoiceError>;

    /// Close the underlying session.
    async fn close(&self) -> Result<(), VoiceError>;

    /// Ask the platform to join a voice channel.
    ///
    /// The returned connection may not be ready yet; callers poll
    /// [`VoiceConnection::is_ready`].
    async fn join(
        &self,
        guild_id: &str,
        channel_id: &str,
        mute: bool,
        deaf: bool,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError>;
}

/// A transient handle to one joined voice channel.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Whether the transport has completed its handshake.
    fn is_ready(&self) -> bool;

    /// Signal speaking on/off to the platform.
    async fn set_speaking(&self, speaking: bool) -> Result<(), VoiceError>;

    /// Push one opus-encoded frame into the platform's outbound channel.
    ///
    /// This is a suspension point: it blocks while the sink is full.
    async fn send_opus(&self, frame: Vec<u8>) -> Result<(), VoiceError>;

    /// Leave the channel.
    async fn disconnect(&self) -> Result<(), VoiceError>;
}
