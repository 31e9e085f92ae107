use super::VOICE_FRAME_BYTES;

/// Slices a raw PCM buffer into fixed-size voice frames.
///
/// Pure in-memory cursor; a partial tail shorter than one frame is discarded
/// rather than padded.
pub struct PcmFrameReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PcmFrameReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Return the next full frame, or `None` at end of stream.
    pub fn read_frame(&mut self) -> Option<&'a [u8]> {
        if self.offset + VOICE_FRAME_BYTES > self.data.len() {
            return None;
        }
        let frame = &self.data[self.offset..self.offset + VOICE_FRAME_BYTES];
        self.offset += VOICE_FRAME_BYTES;
        Some(frame)
    }

    /// Rewind to the beginning of the buffer.
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}
