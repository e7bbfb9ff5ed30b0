//! The canonical unit the normalizer produces and the driver forwards to
//! the provider.

use bytes::Bytes;

/// A canonical audio frame: little-endian PCM16 mono at 16 kHz, length in
/// `[MIN_FRAME_BYTES, MAX_FRAME_BYTES]`, carrying no container headers.
///
/// `sequence` is the frame's arrival order within the session, assigned by
/// the normalizer; it is not reset across epoch renewal.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub bytes: Bytes,
    pub sequence: u64,
}

impl AudioFrame {
    pub fn new(bytes: Bytes, sequence: u64) -> Self {
        Self { bytes, sequence }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
