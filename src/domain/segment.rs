//! Raw and compressed segment value objects

use serde::{Deserialize, Serialize};

/// A contiguous slice of raw mono PCM appended during capture.
///
/// Invariant per clip: `seq` is strictly increasing and
/// `sample_start` of segment *n* equals `sample_end` of segment *n-1*,
/// so the union of segments exactly covers `[0, total_samples)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub clip_id: String,
    pub seq: u64,
    pub sample_start: u64,
    pub sample_end: u64,
    pub samples: Vec<f32>,
}

impl RawSegment {
    pub fn new(clip_id: impl Into<String>, seq: u64, sample_start: u64, samples: Vec<f32>) -> Self {
        let sample_end = sample_start + samples.len() as u64;
        Self {
            clip_id: clip_id.into(),
            seq,
            sample_start,
            sample_end,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A contiguous slice of encoded bytes emitted by the streaming encoder.
///
/// Same contiguity invariant as [`RawSegment`], over the byte axis. The
/// frame store is the source of truth for a clip's `size_bytes` (running
/// max of `byte_end`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedFrame {
    pub clip_id: String,
    pub seq: u64,
    pub byte_start: u64,
    pub byte_end: u64,
    pub bytes: Vec<u8>,
}

impl CompressedFrame {
    pub fn new(clip_id: impl Into<String>, seq: u64, byte_start: u64, bytes: Vec<u8>) -> Self {
        let byte_end = byte_start + bytes.len() as u64;
        Self {
            clip_id: clip_id.into(),
            seq,
            byte_start,
            byte_end,
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Root-mean-square level of a PCM buffer, scaled and clamped to `[0, 1]`
/// for a live meter. An approximation for display, never used for
/// correctness.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum / samples.len() as f32).sqrt();
    (rms * 3.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_segment_end_is_start_plus_len() {
        let seg = RawSegment::new("c", 0, 100, vec![0.0; 50]);
        assert_eq!(seg.sample_end, 150);
        assert_eq!(seg.len(), 50);
    }

    #[test]
    fn compressed_frame_end_is_start_plus_len() {
        let frame = CompressedFrame::new("c", 3, 4096, vec![1u8; 128]);
        assert_eq!(frame.byte_end, 4224);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms_level(&[0.0; 512]), 0.0);
        assert_eq!(rms_level(&[]), 0.0);
    }

    #[test]
    fn rms_is_clamped_to_one() {
        // Full-scale square wave: rms = 1.0, scaled 3.0, clamped to 1.0
        let loud = vec![1.0f32; 256];
        assert_eq!(rms_level(&loud), 1.0);
    }

    #[test]
    fn rms_scales_quiet_signal() {
        let quiet = vec![0.1f32; 256];
        let level = rms_level(&quiet);
        assert!((level - 0.3).abs() < 1e-4);
    }
}
