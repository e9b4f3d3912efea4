//! Sled-backed durable stores
//!
//! One database, four trees: clip records, raw segments, compressed
//! frames, and upload checkpoints. Segment and frame keys are
//! `clip_id \0 seq(BE)` so a prefix scan yields sequence order; values are
//! a fixed 16-byte range header followed by the raw payload.

use std::path::Path;

use async_trait::async_trait;

use crate::application::ports::{
    CheckpointStore, ClipStore, FrameStore, SegmentStore, StoreError,
};
use crate::domain::{Clip, CompressedFrame, RawSegment, TargetKey, UploadCheckpoint};

const CLIPS_TREE: &str = "clips";
const SEGMENTS_TREE: &str = "segments";
const FRAMES_TREE: &str = "frames";
const CHECKPOINTS_TREE: &str = "checkpoints";

/// Process-wide durable storage for the capture/encode/upload pipeline.
pub struct SledStores {
    clips: sled::Tree,
    segments: sled::Tree,
    frames: sled::Tree,
    checkpoints: sled::Tree,
}

impl SledStores {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::ReadFailed(e.to_string()))?;
        Ok(Self {
            clips: open_tree(&db, CLIPS_TREE)?,
            segments: open_tree(&db, SEGMENTS_TREE)?,
            frames: open_tree(&db, FRAMES_TREE)?,
            checkpoints: open_tree(&db, CHECKPOINTS_TREE)?,
        })
    }
}

fn open_tree(db: &sled::Db, name: &str) -> Result<sled::Tree, StoreError> {
    db.open_tree(name)
        .map_err(|e| StoreError::ReadFailed(e.to_string()))
}

/// `clip_id \0 seq(BE)`: NUL never appears in a clip id, and big-endian
/// sequence numbers sort numerically under a prefix scan.
fn seq_key(clip_id: &str, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(clip_id.len() + 9);
    key.extend_from_slice(clip_id.as_bytes());
    key.push(0);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn clip_prefix(clip_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(clip_id.len() + 1);
    prefix.extend_from_slice(clip_id.as_bytes());
    prefix.push(0);
    prefix
}

fn seq_from_key(key: &[u8]) -> Result<u64, StoreError> {
    let tail: [u8; 8] = key[key.len().saturating_sub(8)..]
        .try_into()
        .map_err(|_| StoreError::Corrupt("sequence key too short".into()))?;
    Ok(u64::from_be_bytes(tail))
}

fn range_header(value: &[u8]) -> Result<(u64, u64), StoreError> {
    if value.len() < 16 {
        return Err(StoreError::Corrupt("range header too short".into()));
    }
    let mut start = [0u8; 8];
    let mut end = [0u8; 8];
    start.copy_from_slice(&value[0..8]);
    end.copy_from_slice(&value[8..16]);
    Ok((u64::from_le_bytes(start), u64::from_le_bytes(end)))
}

fn encode_segment(segment: &RawSegment) -> Vec<u8> {
    let mut value = Vec::with_capacity(16 + segment.samples.len() * 4);
    value.extend_from_slice(&segment.sample_start.to_le_bytes());
    value.extend_from_slice(&segment.sample_end.to_le_bytes());
    for sample in &segment.samples {
        value.extend_from_slice(&sample.to_le_bytes());
    }
    value
}

fn decode_samples(value: &[u8]) -> Result<Vec<f32>, StoreError> {
    let payload = &value[16..];
    if payload.len() % 4 != 0 {
        return Err(StoreError::Corrupt("segment payload misaligned".into()));
    }
    Ok(payload
        .chunks_exact(4)
        .map(|b| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(b);
            f32::from_le_bytes(bytes)
        })
        .collect())
}

fn encode_frame(frame: &CompressedFrame) -> Vec<u8> {
    let mut value = Vec::with_capacity(16 + frame.bytes.len());
    value.extend_from_slice(&frame.byte_start.to_le_bytes());
    value.extend_from_slice(&frame.byte_end.to_le_bytes());
    value.extend_from_slice(&frame.bytes);
    value
}

fn checkpoint_key(clip_id: &str, target: &TargetKey) -> Vec<u8> {
    let mut key = clip_prefix(clip_id);
    key.extend_from_slice(target.as_str().as_bytes());
    key
}

fn read_err(e: sled::Error) -> StoreError {
    StoreError::ReadFailed(e.to_string())
}

fn write_err(e: sled::Error) -> StoreError {
    StoreError::WriteFailed(e.to_string())
}

#[async_trait]
impl ClipStore for SledStores {
    async fn put(&self, clip: &Clip) -> Result<(), StoreError> {
        let value = serde_json::to_vec(clip).map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        self.clips
            .insert(clip.id.as_bytes(), value)
            .map_err(write_err)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Clip>, StoreError> {
        match self.clips.get(id.as_bytes()).map_err(read_err)? {
            Some(value) => {
                let clip = serde_json::from_slice(&value)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                Ok(Some(clip))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Clip>, StoreError> {
        let mut clips = Vec::new();
        for entry in self.clips.iter() {
            let (_, value) = entry.map_err(read_err)?;
            let clip: Clip = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            clips.push(clip);
        }
        clips.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        Ok(clips)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.clips.remove(id.as_bytes()).map_err(write_err)?;
        Ok(())
    }
}

#[async_trait]
impl SegmentStore for SledStores {
    async fn append(&self, segment: RawSegment) -> Result<(), StoreError> {
        self.segments
            .insert(
                seq_key(&segment.clip_id, segment.seq),
                encode_segment(&segment),
            )
            .map_err(write_err)?;
        Ok(())
    }

    async fn total_samples(&self, clip_id: &str) -> Result<u64, StoreError> {
        let mut max_end = 0u64;
        for entry in self.segments.scan_prefix(clip_prefix(clip_id)) {
            let (_, value) = entry.map_err(read_err)?;
            let (_, end) = range_header(&value)?;
            max_end = max_end.max(end);
        }
        Ok(max_end)
    }

    async fn read_range(
        &self,
        clip_id: &str,
        start_sample: u64,
        end_sample: u64,
    ) -> Result<Vec<f32>, StoreError> {
        let total = end_sample.saturating_sub(start_sample) as usize;
        let mut out = vec![0f32; total];
        for entry in self.segments.scan_prefix(clip_prefix(clip_id)) {
            let (_, value) = entry.map_err(read_err)?;
            let (seg_start, seg_end) = range_header(&value)?;
            if seg_end <= start_sample || seg_start >= end_sample {
                continue;
            }
            let samples = decode_samples(&value)?;
            let from = start_sample.max(seg_start);
            let to = end_sample.min(seg_end);
            let src = &samples[(from - seg_start) as usize..(to - seg_start) as usize];
            out[(from - start_sample) as usize..(to - start_sample) as usize]
                .copy_from_slice(src);
        }
        Ok(out)
    }

    async fn segments(&self, clip_id: &str) -> Result<Vec<RawSegment>, StoreError> {
        let mut result = Vec::new();
        for entry in self.segments.scan_prefix(clip_prefix(clip_id)) {
            let (key, value) = entry.map_err(read_err)?;
            let (start, _) = range_header(&value)?;
            let seq = seq_from_key(&key)?;
            result.push(RawSegment::new(clip_id, seq, start, decode_samples(&value)?));
        }
        Ok(result)
    }

    async fn clear(&self, clip_id: &str) -> Result<(), StoreError> {
        let keys: Vec<_> = self
            .segments
            .scan_prefix(clip_prefix(clip_id))
            .keys()
            .collect::<Result<_, _>>()
            .map_err(read_err)?;
        for key in keys {
            self.segments.remove(key).map_err(write_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl FrameStore for SledStores {
    async fn append(&self, frame: CompressedFrame) -> Result<(), StoreError> {
        self.frames
            .insert(seq_key(&frame.clip_id, frame.seq), encode_frame(&frame))
            .map_err(write_err)?;
        Ok(())
    }

    async fn total_bytes(&self, clip_id: &str) -> Result<u64, StoreError> {
        let mut max_end = 0u64;
        for entry in self.frames.scan_prefix(clip_prefix(clip_id)) {
            let (_, value) = entry.map_err(read_err)?;
            let (_, end) = range_header(&value)?;
            max_end = max_end.max(end);
        }
        Ok(max_end)
    }

    async fn read_range(
        &self,
        clip_id: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, StoreError> {
        let total = end.saturating_sub(start) as usize;
        let mut out = vec![0u8; total];
        for entry in self.frames.scan_prefix(clip_prefix(clip_id)) {
            let (_, value) = entry.map_err(read_err)?;
            let (frame_start, frame_end) = range_header(&value)?;
            if frame_end <= start || frame_start >= end {
                continue;
            }
            let bytes = &value[16..];
            let from = start.max(frame_start);
            let to = end.min(frame_end);
            let src = &bytes[(from - frame_start) as usize..(to - frame_start) as usize];
            out[(from - start) as usize..(to - start) as usize].copy_from_slice(src);
        }
        Ok(out)
    }

    async fn clear(&self, clip_id: &str) -> Result<(), StoreError> {
        let keys: Vec<_> = self
            .frames
            .scan_prefix(clip_prefix(clip_id))
            .keys()
            .collect::<Result<_, _>>()
            .map_err(read_err)?;
        for key in keys {
            self.frames.remove(key).map_err(write_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SledStores {
    async fn get(
        &self,
        clip_id: &str,
        target: &TargetKey,
    ) -> Result<Option<UploadCheckpoint>, StoreError> {
        match self
            .checkpoints
            .get(checkpoint_key(clip_id, target))
            .map_err(read_err)?
        {
            Some(value) => {
                let checkpoint = serde_json::from_slice(&value)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, checkpoint: &UploadCheckpoint) -> Result<(), StoreError> {
        let value = serde_json::to_vec(checkpoint)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        self.checkpoints
            .insert(
                checkpoint_key(&checkpoint.clip_id, &checkpoint.target_key),
                value,
            )
            .map_err(write_err)?;
        Ok(())
    }

    async fn clear(&self, clip_id: &str) -> Result<(), StoreError> {
        let keys: Vec<_> = self
            .checkpoints
            .scan_prefix(clip_prefix(clip_id))
            .keys()
            .collect::<Result<_, _>>()
            .map_err(read_err)?;
        for key in keys {
            self.checkpoints.remove(key).map_err(write_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (SledStores, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let stores = SledStores::open(dir.path().join("db")).unwrap();
        (stores, dir)
    }

    #[tokio::test]
    async fn segments_round_trip_in_sequence_order() {
        let (stores, _dir) = open_temp();

        for seq in 0..5u64 {
            let samples = vec![seq as f32; 100];
            SegmentStore::append(&stores, RawSegment::new("clip-a", seq, seq * 100, samples))
                .await
                .unwrap();
        }

        assert_eq!(
            SegmentStore::total_samples(&stores, "clip-a").await.unwrap(),
            500
        );

        let segments = stores.segments("clip-a").await.unwrap();
        assert_eq!(segments.len(), 5);
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.seq, i as u64);
            assert_eq!(seg.sample_start, i as u64 * 100);
            assert_eq!(seg.samples, vec![i as f32; 100]);
        }
    }

    #[tokio::test]
    async fn segment_range_read_crosses_boundaries() {
        let (stores, _dir) = open_temp();
        SegmentStore::append(&stores, RawSegment::new("clip-a", 0, 0, vec![1.0; 100]))
            .await
            .unwrap();
        SegmentStore::append(&stores, RawSegment::new("clip-a", 1, 100, vec![2.0; 100]))
            .await
            .unwrap();

        let out = SegmentStore::read_range(&stores, "clip-a", 50, 150)
            .await
            .unwrap();
        assert_eq!(out.len(), 100);
        assert!(out[..50].iter().all(|&s| s == 1.0));
        assert!(out[50..].iter().all(|&s| s == 2.0));
    }

    #[tokio::test]
    async fn sequence_order_survives_large_seq_numbers() {
        let (stores, _dir) = open_temp();
        // big-endian keys keep 2 < 10 < 300 in scan order
        for seq in [300u64, 2, 10] {
            SegmentStore::append(&stores, RawSegment::new("clip-a", seq, seq, vec![0.0; 1]))
                .await
                .unwrap();
        }
        let seqs: Vec<u64> = stores
            .segments("clip-a")
            .await
            .unwrap()
            .iter()
            .map(|s| s.seq)
            .collect();
        assert_eq!(seqs, vec![2, 10, 300]);
    }

    #[tokio::test]
    async fn clear_removes_only_that_clip() {
        let (stores, _dir) = open_temp();
        SegmentStore::append(&stores, RawSegment::new("clip-a", 0, 0, vec![1.0; 10]))
            .await
            .unwrap();
        SegmentStore::append(&stores, RawSegment::new("clip-b", 0, 0, vec![1.0; 10]))
            .await
            .unwrap();

        SegmentStore::clear(&stores, "clip-a").await.unwrap();
        assert_eq!(
            SegmentStore::total_samples(&stores, "clip-a").await.unwrap(),
            0
        );
        assert_eq!(
            SegmentStore::total_samples(&stores, "clip-b").await.unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn frames_range_read_and_total() {
        let (stores, _dir) = open_temp();
        FrameStore::append(&stores, CompressedFrame::new("clip-a", 0, 0, vec![1u8; 64]))
            .await
            .unwrap();
        FrameStore::append(&stores, CompressedFrame::new("clip-a", 1, 64, vec![2u8; 64]))
            .await
            .unwrap();

        assert_eq!(FrameStore::total_bytes(&stores, "clip-a").await.unwrap(), 128);
        let out = FrameStore::read_range(&stores, "clip-a", 32, 96).await.unwrap();
        assert_eq!(out.len(), 64);
        assert!(out[..32].iter().all(|&b| b == 1));
        assert!(out[32..].iter().all(|&b| b == 2));
    }

    #[tokio::test]
    async fn clips_list_newest_first() {
        let (stores, _dir) = open_temp();
        for (id, at) in [("a", 10), ("b", 30), ("c", 20)] {
            ClipStore::put(&stores, &Clip::new(id, id, 48000, 1, at))
                .await
                .unwrap();
        }
        let ids: Vec<String> = stores
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn clip_record_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let stores = SledStores::open(&path).unwrap();
            ClipStore::put(&stores, &Clip::new("persist", "persist", 48000, 1, 1))
                .await
                .unwrap();
        }
        let stores = SledStores::open(&path).unwrap();
        let clip = ClipStore::get(&stores, "persist").await.unwrap().unwrap();
        assert_eq!(clip.title, "persist");
    }

    #[tokio::test]
    async fn checkpoints_are_isolated_per_target() {
        let (stores, _dir) = open_temp();
        let key_a = TargetKey::from_url("http://a.local");
        let key_b = TargetKey::from_url("http://b.local");

        let mut cp = UploadCheckpoint::new("clip-a", key_a.clone());
        cp.advance(4096);
        CheckpointStore::put(&stores, &cp).await.unwrap();

        let loaded = CheckpointStore::get(&stores, "clip-a", &key_a)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.offset, 4096);
        assert!(CheckpointStore::get(&stores, "clip-a", &key_b)
            .await
            .unwrap()
            .is_none());

        CheckpointStore::clear(&stores, "clip-a").await.unwrap();
        assert!(CheckpointStore::get(&stores, "clip-a", &key_a)
            .await
            .unwrap()
            .is_none());
    }
}
