//! Audio plumbing for the voice pipeline: WAV framing, the external
//! transcoder client, and the fixed-size PCM frame reader.

pub mod converter;
pub mod frame;
pub mod wav;

pub use converter::{AudioConverter, AudioError};
pub use frame::PcmFrameReader;

/// Sample rate required by the voice platform.
pub const VOICE_SAMPLE_RATE: u32 = 48_000;

/// Channel count required by the voice platform.
pub const VOICE_CHANNELS: u32 = 2;

/// Samples per channel in one 20 ms frame.
pub const VOICE_FRAME_SAMPLES: usize = 960;

/// Size of one PCM frame in bytes (stereo 16-bit).
pub const VOICE_FRAME_BYTES: usize = VOICE_FRAME_SAMPLES * VOICE_CHANNELS as usize * 2;
