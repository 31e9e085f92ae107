//! Canonical WAV header handling for raw PCM produced by TTS engines.

/// Size of a standard WAV file header in bytes.
pub const HEADER_SIZE: usize = 44;

/// Audio format code for uncompressed PCM.
pub const FORMAT_PCM: u16 = 1;

/// Default sample rate output by Piper TTS.
pub const PIPER_SAMPLE_RATE: u32 = 22_050;

/// Default channel count output by Piper TTS (mono).
pub const PIPER_CHANNELS: u16 = 1;

/// Default bit depth output by Piper TTS.
pub const PIPER_BITS_PER_SAMPLE: u16 = 16;

/// Wrap raw PCM bytes in a canonical 44-byte RIFF/WAVE header.
///
/// The byte rate and block alignment are derived from the parameters and the
/// data-chunk length is set to the PCM payload size.
pub fn wrap_raw_pcm(pcm: &[u8], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let data_size = pcm.len() as u32;
    let byte_rate = sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
    let block_align = channels * bits_per_sample / 8;

    let mut out = Vec::with_capacity(HEADER_SIZE + pcm.len());

    // RIFF header
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_size).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt subchunk
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data subchunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
    out.extend_from_slice(pcm);

    out
}

/// Build a minimal valid WAV file holding `num_samples` of silence.
///
/// Test helper for code that consumes WAV input.
pub fn create_minimal(num_samples: usize, sample_rate: u32, channels: u16, bits: u16) -> Vec<u8> {
    let data_size = num_samples * channels as usize * (bits as usize / 8);
    wrap_raw_pcm(&vec![0u8; data_size], sample_rate, channels, bits)
}

/// Minimal WAV matching Piper's output format.
pub fn create_minimal_piper(num_samples: usize) -> Vec<u8> {
    create_minimal(
        num_samples,
        PIPER_SAMPLE_RATE,
        PIPER_CHANNELS,
        PIPER_BITS_PER_SAMPLE,
    )
}
