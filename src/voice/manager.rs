use std::sync::Arc;
use std::time::Duration;

use audiopus::coder::Encoder as OpusEncoder;
use audiopus::{Application, Channels, SampleRate};
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::{PcmFrameReader, VOICE_FRAME_SAMPLES};

use super::session::{VoiceConnection, VoiceError, VoiceSession};

/// Maximum size of one encoded opus frame.
const MAX_OPUS_DATA_BYTES: usize = 4000;

/// Duration of one platform audio frame.
const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Timing knobs for voice attachment. Defaults match the platform's
/// recommended values; tests shrink them.
#[derive(Debug, Clone)]
pub struct VoiceTiming {
    /// Per-attempt deadline for the readiness wait.
    pub connect_timeout: Duration,
    /// Readiness polling interval.
    pub connect_poll_interval: Duration,
    /// Maximum number of join attempts.
    pub max_connect_retries: u32,
    /// Fixed delay between join attempts.
    pub connect_retry_delay: Duration,
}

impl Default for VoiceTiming {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            connect_poll_interval: Duration::from_millis(100),
            max_connect_retries: 3,
            connect_retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Default)]
struct AttachState {
    conn: Option<Arc<dyn VoiceConnection>>,
    attached: bool,
}

/// Manages the attachment to the configured voice channel and streams paced
/// opus frames into it.
pub struct VoiceManager {
    session: Arc<dyn VoiceSession>,
    guild_id: String,
    channel_id: String,
    timing: VoiceTiming,
    state: Mutex<AttachState>,
    encoder: parking_lot::Mutex<OpusEncoder>,
}

impl VoiceManager {
    pub fn new(
        session: Arc<dyn VoiceSession>,
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
        timing: VoiceTiming,
    ) -> Result<Self, VoiceError> {
        // 48 kHz stereo, voip profile
        let encoder = OpusEncoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Voip)
            .map_err(|e| VoiceError::Encoding(e.to_string()))?;

        Ok(Self {
            session,
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            timing,
            state: Mutex::new(AttachState::default()),
            encoder: parking_lot::Mutex::new(encoder),
        })
    }

    /// Open the platform session.
    pub async fn open(&self) -> Result<(), VoiceError> {
        self.session.open().await
    }

    /// Close the platform session, disconnecting any live voice handle first.
    pub async fn close(&self) -> Result<(), VoiceError> {
        {
            let mut state = self.state.lock().await;
            if let Some(conn) = state.conn.take() {
                let _ = conn.disconnect().await;
            }
            state.attached = false;
        }
        self.session.close().await
    }

    /// Join the configured voice channel with bounded retries.
    ///
    /// Each attempt joins and then waits for the handle's readiness signal
    /// under a deadline. All retries exhausted yields `ConnectionFailed`;
    /// cancellation of `token` aborts immediately.
    pub async fn connect(&self, token: &CancellationToken) -> Result<(), VoiceError> {
        let mut state = self.state.lock().await;

        if state.attached && state.conn.is_some() {
            return Ok(());
        }

        let mut last_err = None;
        for attempt in 1..=self.timing.max_connect_retries {
            info!(
                guild_id = %self.guild_id,
                channel_id = %self.channel_id,
                attempt,
                max_attempts = self.timing.max_connect_retries,
                "connecting to voice channel"
            );

            match self.connect_once(token, &mut state).await {
                Ok(()) => return Ok(()),
                Err(VoiceError::Cancelled) => return Err(VoiceError::Cancelled),
                Err(err) => {
                    if token.is_cancelled() {
                        return Err(VoiceError::Cancelled);
                    }
                    warn!(attempt, error = %err, "voice connection failed, retrying");
                    last_err = Some(err);
                }
            }

            if attempt < self.timing.max_connect_retries {
                tokio::select! {
                    _ = token.cancelled() => return Err(VoiceError::Cancelled),
                    _ = tokio::time::sleep(self.timing.connect_retry_delay) => {}
                }
            }
        }

        let last = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        error!(
            attempts = self.timing.max_connect_retries,
            error = %last,
            "voice connection failed after all retries"
        );
        Err(VoiceError::ConnectionFailed(last))
    }

    async fn connect_once(
        &self,
        token: &CancellationToken,
        state: &mut AttachState,
    ) -> Result<(), VoiceError> {
        // mute=false, deaf=true - the announcer never listens
        let conn = self
            .session
            .join(&self.guild_id, &self.channel_id, false, true)
            .await?;

        if let Err(err) = self.wait_for_ready(token, conn.as_ref()).await {
            let _ = conn.disconnect().await;
            return Err(err);
        }

        state.conn = Some(conn);
        state.attached = true;
        info!("connected to voice channel");
        Ok(())
    }

    /// Poll the handle's readiness flag under a per-attempt deadline.
    async fn wait_for_ready(
        &self,
        token: &CancellationToken,
        conn: &dyn VoiceConnection,
    ) -> Result<(), VoiceError> {
        let deadline = Instant::now() + self.timing.connect_timeout;
        let mut ticker = tokio::time::interval(self.timing.connect_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(VoiceError::Cancelled),
                tick = ticker.tick() => {
                    if conn.is_ready() {
                        return Ok(());
                    }
                    if tick >= deadline {
                        error!(
                            timeout = ?self.timing.connect_timeout,
                            "timeout waiting for voice connection ready"
                        );
                        return Err(VoiceError::ConnectionFailed(
                            "timeout waiting for ready".to_string(),
                        ));
                    }
                }
            }
        }
    }

    /// Leave the voice channel. No-op when already detached.
    pub async fn disconnect(&self) -> Result<(), VoiceError> {
        let mut state = self.state.lock().await;

        let Some(conn) = state.conn.take() else {
            return Ok(());
        };

        info!("disconnecting from voice channel");
        state.attached = false;
        conn.disconnect().await
    }

    /// Whether the manager currently holds a ready voice handle.
    pub async fn is_attached(&self) -> bool {
        let state = self.state.lock().await;
        state.attached && state.conn.is_some()
    }

    /// Stream PCM audio into the voice channel as paced opus frames.
    ///
    /// `pcm` must be 48 kHz stereo 16-bit signed little-endian. Frames go
    /// out on a 20 ms ticker; cancellation of `token` between or during a
    /// send aborts the stream. Speaking is signalled off on every return
    /// path, errors there logged and swallowed.
    pub async fn send_audio(
        &self,
        token: &CancellationToken,
        pcm: &[u8],
    ) -> Result<(), VoiceError> {
        let conn = {
            let state = self.state.lock().await;
            if !state.attached {
                return Err(VoiceError::NotAttached);
            }
            state.conn.clone().ok_or(VoiceError::NotAttached)?
        };

        if let Err(err) = conn.set_speaking(true).await {
            error!(error = %err, action = "start_speaking", "failed to set speaking state");
            return Err(VoiceError::SpeakingFailed(err.to_string()));
        }

        let result = self.stream_frames(token, conn.as_ref(), pcm).await;

        if let Err(err) = conn.set_speaking(false).await {
            warn!(error = %err, action = "stop_speaking", "failed to clear speaking state");
        }

        result
    }

    async fn stream_frames(
        &self,
        token: &CancellationToken,
        conn: &dyn VoiceConnection,
        pcm: &[u8],
    ) -> Result<(), VoiceError> {
        let mut reader = PcmFrameReader::new(pcm);

        // A monotonic ticker, not sleep-for-delta: a slow sink stretches the
        // audio instead of skewing or dropping frames.
        let mut ticker =
            tokio::time::interval_at(Instant::now() + FRAME_DURATION, FRAME_DURATION);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut frames_sent: u64 = 0;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(frames_sent, "audio sending interrupted");
                    return Err(VoiceError::Cancelled);
                }
                _ = ticker.tick() => {
                    let Some(frame) = reader.read_frame() else {
                        debug!(frames_sent, "audio sending complete");
                        return Ok(());
                    };

                    let opus = match self.encode_frame(frame) {
                        Ok(data) => data,
                        Err(err) => {
                            // A single bad frame is skipped, not fatal
                            error!(error = %err, frame = frames_sent, "opus encoding failed");
                            continue;
                        }
                    };

                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(frames_sent, "audio sending interrupted during send");
                            return Err(VoiceError::Cancelled);
                        }
                        sent = conn.send_opus(opus) => {
                            sent?;
                            frames_sent += 1;
                        }
                    }
                }
            }
        }
    }

    /// Encode one PCM frame (960 samples x 2 channels, s16le) to opus.
    fn encode_frame(&self, pcm: &[u8]) -> Result<Vec<u8>, VoiceError> {
        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        debug_assert_eq!(samples.len(), VOICE_FRAME_SAMPLES * 2);

        let mut output = vec![0u8; MAX_OPUS_DATA_BYTES];
        let written = {
            let mut encoder = self.encoder.lock();
            encoder
                .encode(&samples, &mut output)
                .map_err(|e| VoiceError::Encoding(e.to_string()))?
        };
        output.truncate(written);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::VOICE_FRAME_BYTES;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn test_timing() -> VoiceTiming {
        VoiceTiming {
            connect_timeout: Duration::from_millis(200),
            connect_poll_interval: Duration::from_millis(10),
            max_connect_retries: 3,
            connect_retry_delay: Duration::from_millis(10),
        }
    }

    #[derive(Default)]
    struct MockConnection {
        ready: AtomicBool,
        disconnected: AtomicBool,
        speaking_fails: AtomicBool,
        speaking: parking_lot::Mutex<Vec<bool>>,
        frames: parking_lot::Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl VoiceConnection for MockConnection {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn set_speaking(&self, speaking: bool) -> Result<(), VoiceError> {
            if speaking && self.speaking_fails.load(Ordering::SeqCst) {
                return Err(VoiceError::Session("speaking rejected".to_string()));
            }
            self.speaking.lock().push(speaking);
            Ok(())
        }

        async fn send_opus(&self, frame: Vec<u8>) -> Result<(), VoiceError> {
            self.frames.lock().push(frame);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), VoiceError> {
            self.disconnected.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockSession {
        conn: Arc<MockConnection>,
        joins: AtomicU32,
    }

    impl MockSession {
        fn new(conn: Arc<MockConnection>) -> Self {
            Self {
                conn,
                joins: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl VoiceSession for MockSession {
        async fn open(&self) -> Result<(), VoiceError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), VoiceError> {
            Ok(())
        }

        async fn join(
            &self,
            _guild_id: &str,
            _channel_id: &str,
            _mute: bool,
            _deaf: bool,
        ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
            self.joins.fetch_add(1, Ordering::SeqCst);
            Ok(self.conn.clone())
        }
    }

    fn manager_with(conn: Arc<MockConnection>) -> (VoiceManager, Arc<MockSession>) {
        let session = Arc::new(MockSession::new(conn));
        let manager =
            VoiceManager::new(session.clone(), "guild", "channel", test_timing()).unwrap();
        (manager, session)
    }

    #[tokio::test]
    async fn connect_succeeds_when_ready() {
        let conn = Arc::new(MockConnection::default());
        conn.ready.store(true, Ordering::SeqCst);
        let (manager, session) = manager_with(conn);

        let token = CancellationToken::new();
        manager.connect(&token).await.unwrap();

        assert!(manager.is_attached().await);
        assert_eq!(session.joins.load(Ordering::SeqCst), 1);

        // Second connect is a no-op while attached
        manager.connect(&token).await.unwrap();
        assert_eq!(session.joins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_exhausts_retries_when_never_ready() {
        let conn = Arc::new(MockConnection::default());
        let (manager, session) = manager_with(conn.clone());

        let token = CancellationToken::new();
        let err = manager.connect(&token).await.unwrap_err();

        assert!(matches!(err, VoiceError::ConnectionFailed(_)));
        assert_eq!(session.joins.load(Ordering::SeqCst), 3);
        // Each failed attempt disconnects its transient handle
        assert!(conn.disconnected.load(Ordering::SeqCst));
        assert!(!manager.is_attached().await);
    }

    #[tokio::test]
    async fn connect_aborts_on_cancellation() {
        let conn = Arc::new(MockConnection::default());
        let (manager, _session) = manager_with(conn);

        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        });

        let err = manager.connect(&token).await.unwrap_err();
        assert!(matches!(err, VoiceError::Cancelled));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let conn = Arc::new(MockConnection::default());
        conn.ready.store(true, Ordering::SeqCst);
        let (manager, _session) = manager_with(conn.clone());

        // Detached: no-op
        manager.disconnect().await.unwrap();

        let token = CancellationToken::new();
        manager.connect(&token).await.unwrap();
        manager.disconnect().await.unwrap();
        assert!(!manager.is_attached().await);
        assert!(conn.disconnected.load(Ordering::SeqCst));

        manager.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn send_audio_requires_attachment() {
        let conn = Arc::new(MockConnection::default());
        let (manager, _session) = manager_with(conn);

        let token = CancellationToken::new();
        let err = manager
            .send_audio(&token, &[0u8; VOICE_FRAME_BYTES])
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::NotAttached));
    }

    #[tokio::test]
    async fn send_audio_paces_whole_frames() {
        let conn = Arc::new(MockConnection::default());
        conn.ready.store(true, Ordering::SeqCst);
        let (manager, _session) = manager_with(conn.clone());

        let token = CancellationToken::new();
        manager.connect(&token).await.unwrap();

        // Two full frames plus a partial tail that must be discarded
        let pcm = vec![0u8; VOICE_FRAME_BYTES * 2 + 17];
        manager.send_audio(&token, &pcm).await.unwrap();

        assert_eq!(conn.frames.lock().len(), 2);
        assert_eq!(*conn.speaking.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn send_audio_speaking_failure_sends_nothing() {
        let conn = Arc::new(MockConnection::default());
        conn.ready.store(true, Ordering::SeqCst);
        conn.speaking_fails.store(true, Ordering::SeqCst);
        let (manager, _session) = manager_with(conn.clone());

        let token = CancellationToken::new();
        manager.connect(&token).await.unwrap();

        let err = manager
            .send_audio(&token, &[0u8; VOICE_FRAME_BYTES])
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::SpeakingFailed(_)));
        assert!(conn.frames.lock().is_empty());
    }

    #[tokio::test]
    async fn send_audio_observes_cancellation_between_frames() {
        let conn = Arc::new(MockConnection::default());
        conn.ready.store(true, Ordering::SeqCst);
        let (manager, _session) = manager_with(conn.clone());

        let token = CancellationToken::new();
        manager.connect(&token).await.unwrap();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        // Long enough that cancellation lands mid-stream
        let pcm = vec![0u8; VOICE_FRAME_BYTES * 250];
        let err = manager.send_audio(&token, &pcm).await.unwrap_err();
        assert!(matches!(err, VoiceError::Cancelled));

        let frames = conn.frames.lock().len();
        assert!(frames < 250, "stream should have been cut short, sent {frames}");
        // Speaking was still signalled off on the error path
        assert_eq!(conn.speaking.lock().last(), Some(&false));
    }

    #[tokio::test]
    async fn close_tears_down_live_handle() {
        let conn = Arc::new(MockConnection::default());
        conn.ready.store(true, Ordering::SeqCst);
        let (manager, _session) = manager_with(conn.clone());

        let token = CancellationToken::new();
        manager.connect(&token).await.unwrap();
        manager.close().await.unwrap();

        assert!(conn.disconnected.load(Ordering::SeqCst));
        assert!(!manager.is_attached().await);
    }
}
