//! Strips WAV headers, coalesces jittery client chunks into canonical
//! frames, and validates PCM alignment.

use bytes::{Bytes, BytesMut};

use crate::error::{SessionError, SessionResult};
use crate::protocol_constants::MIN_FRAME_BYTES;

use super::frame::AudioFrame;

/// Stateful per-epoch normalizer. One instance is created per epoch via
/// [`Normalizer::start_epoch`]; residue never crosses an epoch boundary
/// because the epoch-close flush drains it first.
pub struct Normalizer {
    residue: BytesMut,
    /// Whether the next payload fed to this epoch is still subject to WAV
    /// header detection. Cleared after the first payload of the epoch.
    awaiting_first_payload: bool,
    sequence: u64,
}

impl Normalizer {
    /// Starts a new epoch. `sequence` continues from the prior epoch's
    /// counter; only the residue and header-detection state reset.
    pub fn start_epoch(sequence: u64) -> Self {
        Self {
            residue: BytesMut::new(),
            awaiting_first_payload: true,
            sequence,
        }
    }

    /// Feeds one client payload, returning zero or more canonical frames.
    ///
    /// Never blocks; pure transformation plus the internal residue buffer.
    pub fn feed(&mut self, payload: Bytes) -> SessionResult<Vec<AudioFrame>> {
        if payload.len() % 2 != 0 {
            return Err(SessionError::AudioFormat(format!(
                "payload of {} bytes is not a multiple of 2 (misaligned PCM16)",
                payload.len()
            )));
        }

        let payload = if self.awaiting_first_payload {
            self.awaiting_first_payload = false;
            strip_wav_header(&payload).map_or(payload.clone(), |data_offset| {
                payload.slice(data_offset..)
            })
        } else {
            payload
        };

        self.residue.extend_from_slice(&payload);

        Ok(self.cut_frames())
    }

    /// Epoch close: right-pads a non-empty residue to `MIN_FRAME_BYTES` and
    /// enqueues it, then resets. Returns the padded frame, if any.
    pub fn flush(&mut self) -> Option<AudioFrame> {
        if self.residue.is_empty() {
            return None;
        }

        let mut tail = std::mem::take(&mut self.residue);
        if tail.len() < MIN_FRAME_BYTES {
            tail.resize(MIN_FRAME_BYTES, 0);
        }
        let frame = self.next_frame(tail.freeze());
        Some(frame)
    }

    /// Cuts frames of exactly `MIN_FRAME_BYTES` while the buffer allows.
    /// The remaining tail is always below `MIN_FRAME_BYTES` and stays as
    /// residue until the next payload or the epoch-close flush.
    fn cut_frames(&mut self) -> Vec<AudioFrame> {
        let mut frames = Vec::new();

        while self.residue.len() >= MIN_FRAME_BYTES {
            let chunk = self.residue.split_to(MIN_FRAME_BYTES).freeze();
            frames.push(self.next_frame(chunk));
        }

        frames
    }

    fn next_frame(&mut self, bytes: Bytes) -> AudioFrame {
        let frame = AudioFrame::new(bytes, self.sequence);
        self.sequence += 1;
        frame
    }
}

/// If `payload` begins with a RIFF/WAVE container, scans sub-chunks for
/// `data` and returns the byte offset immediately after its 8-byte header.
/// Returns `None` for headerless payloads.
fn strip_wav_header(payload: &[u8]) -> Option<usize> {
    if payload.len() < 12 || &payload[0..4] != b"RIFF" || &payload[8..12] != b"WAVE" {
        return None;
    }

    let mut offset = 12;
    while offset + 8 <= payload.len() {
        let chunk_id = &payload[offset..offset + 4];
        let chunk_size =
            u32::from_le_bytes(payload[offset + 4..offset + 8].try_into().ok()?) as usize;
        let data_start = offset + 8;

        if chunk_id == b"data" {
            return Some(data_start);
        }

        offset = data_start + chunk_size + (chunk_size % 2);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol_constants::MAX_FRAME_BYTES;

    fn pcm_bytes(n: usize) -> Bytes {
        Bytes::from(vec![1u8; n])
    }

    #[test]
    fn coalesces_small_payloads_into_min_frame() {
        let mut norm = Normalizer::start_epoch(0);
        let frames = norm.feed(pcm_bytes(1600)).unwrap();
        assert!(frames.is_empty(), "below MIN_FRAME_BYTES stays in residue");

        let frames = norm.feed(pcm_bytes(1600)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), MIN_FRAME_BYTES);
    }

    #[test]
    fn splits_oversized_payload_into_bounded_frames() {
        let mut norm = Normalizer::start_epoch(0);
        let frames = norm.feed(pcm_bytes(10_000)).unwrap();

        assert_eq!(frames.len(), 3);
        for f in &frames {
            assert!(f.len() >= MIN_FRAME_BYTES);
            assert!(f.len() <= MAX_FRAME_BYTES);
        }

        // The 400-byte tail is carried as residue and surfaces, zero-padded,
        // in the epoch-close flush. The payload's bytes are all `1`.
        let flush = norm.flush().expect("tail flushes");
        assert_eq!(flush.len(), MIN_FRAME_BYTES);
        assert!(flush.bytes[..400].iter().all(|&b| b == 1));
        assert!(flush.bytes[400..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_misaligned_payload() {
        use crate::error::ErrorCode;

        let mut norm = Normalizer::start_epoch(0);
        let err = norm.feed(Bytes::from(vec![1u8; 3])).unwrap_err();
        assert_eq!(err.code(), "kAudioFormat");
    }

    #[test]
    fn strips_wav_header_on_first_payload_only() {
        let mut header = BytesMut::new();
        header.extend_from_slice(b"RIFF");
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(b"WAVE");
        header.extend_from_slice(b"data");
        header.extend_from_slice(&3200u32.to_le_bytes());
        header.extend_from_slice(&vec![2u8; 3200]);

        let mut norm = Normalizer::start_epoch(0);
        let frames = norm.feed(header.freeze()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), MIN_FRAME_BYTES);
        assert!(frames[0].bytes.iter().all(|&b| b == 2));
    }

    #[test]
    fn wav_header_of_exactly_44_bytes_with_zero_pcm_enqueues_nothing() {
        let mut header = BytesMut::new();
        header.extend_from_slice(b"RIFF");
        header.extend_from_slice(&36u32.to_le_bytes());
        header.extend_from_slice(b"WAVE");
        header.extend_from_slice(b"fmt ");
        header.extend_from_slice(&16u32.to_le_bytes());
        header.extend_from_slice(&[0u8; 16]);
        header.extend_from_slice(b"data");
        header.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(header.len(), 44);

        let mut norm = Normalizer::start_epoch(0);
        let frames = norm.feed(header.freeze()).unwrap();
        assert!(frames.is_empty());
        assert!(norm.flush().is_none(), "empty residue yields no flush frame");
    }

    #[test]
    fn flush_pads_residue_to_min_frame() {
        let mut norm = Normalizer::start_epoch(0);
        norm.feed(pcm_bytes(1600)).unwrap();
        let frame = norm.flush().expect("non-empty residue flushes");
        assert_eq!(frame.len(), MIN_FRAME_BYTES);
        assert!(frame.bytes[1600..].iter().all(|&b| b == 0));
    }

    #[test]
    fn normalization_is_idempotent_on_already_canonical_frames() {
        let mut norm = Normalizer::start_epoch(0);
        let frames = norm.feed(pcm_bytes(MIN_FRAME_BYTES)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), MIN_FRAME_BYTES);
        assert!(norm.flush().is_none());
    }

    #[test]
    fn sequence_increases_across_feeds() {
        let mut norm = Normalizer::start_epoch(10);
        let frames = norm.feed(pcm_bytes(MIN_FRAME_BYTES * 2)).unwrap();
        assert_eq!(frames[0].sequence, 10);
        assert_eq!(frames[1].sequence, 11);
    }
}
