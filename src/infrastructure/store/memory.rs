//! In-memory stores
//!
//! BTreeMap-backed implementations of the store ports with the same
//! ordering and range semantics as the sled adapters. Used by tests and
//! anywhere durability is not wanted.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::ports::{
    CheckpointStore, ClipStore, FrameStore, SegmentStore, StoreError,
};
use crate::domain::{Clip, CompressedFrame, RawSegment, TargetKey, UploadCheckpoint};

/// Non-durable counterpart of the sled stores.
#[derive(Default)]
pub struct InMemoryStores {
    clips: Mutex<BTreeMap<String, Clip>>,
    segments: Mutex<BTreeMap<(String, u64), RawSegment>>,
    frames: Mutex<BTreeMap<(String, u64), CompressedFrame>>,
    checkpoints: Mutex<BTreeMap<(String, String), UploadCheckpoint>>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClipStore for InMemoryStores {
    async fn put(&self, clip: &Clip) -> Result<(), StoreError> {
        self.clips
            .lock()
            .await
            .insert(clip.id.clone(), clip.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Clip>, StoreError> {
        Ok(self.clips.lock().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Clip>, StoreError> {
        let mut clips: Vec<Clip> = self.clips.lock().await.values().cloned().collect();
        clips.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        Ok(clips)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.clips.lock().await.remove(id);
        Ok(())
    }
}

#[async_trait]
impl SegmentStore for InMemoryStores {
    async fn append(&self, segment: RawSegment) -> Result<(), StoreError> {
        self.segments
            .lock()
            .await
            .insert((segment.clip_id.clone(), segment.seq), segment);
        Ok(())
    }

    async fn total_samples(&self, clip_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .segments
            .lock()
            .await
            .values()
            .filter(|s| s.clip_id == clip_id)
            .map(|s| s.sample_end)
            .max()
            .unwrap_or(0))
    }

    async fn read_range(
        &self,
        clip_id: &str,
        start_sample: u64,
        end_sample: u64,
    ) -> Result<Vec<f32>, StoreError> {
        let total = end_sample.saturating_sub(start_sample) as usize;
        let mut out = vec![0f32; total];
        for segment in self.segments.lock().await.values() {
            if segment.clip_id != clip_id
                || segment.sample_end <= start_sample
                || segment.sample_start >= end_sample
            {
                continue;
            }
            let from = start_sample.max(segment.sample_start);
            let to = end_sample.min(segment.sample_end);
            let src = &segment.samples
                [(from - segment.sample_start) as usize..(to - segment.sample_start) as usize];
            out[(from - start_sample) as usize..(to - start_sample) as usize]
                .copy_from_slice(src);
        }
        Ok(out)
    }

    async fn segments(&self, clip_id: &str) -> Result<Vec<RawSegment>, StoreError> {
        Ok(self
            .segments
            .lock()
            .await
            .values()
            .filter(|s| s.clip_id == clip_id)
            .cloned()
            .collect())
    }

    async fn clear(&self, clip_id: &str) -> Result<(), StoreError> {
        self.segments
            .lock()
            .await
            .retain(|(id, _), _| id != clip_id);
        Ok(())
    }
}

#[async_trait]
impl FrameStore for InMemoryStores {
    async fn append(&self, frame: CompressedFrame) -> Result<(), StoreError> {
        self.frames
            .lock()
            .await
            .insert((frame.clip_id.clone(), frame.seq), frame);
        Ok(())
    }

    async fn total_bytes(&self, clip_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .frames
            .lock()
            .await
            .values()
            .filter(|f| f.clip_id == clip_id)
            .map(|f| f.byte_end)
            .max()
            .unwrap_or(0))
    }

    async fn read_range(
        &self,
        clip_id: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, StoreError> {
        let total = end.saturating_sub(start) as usize;
        let mut out = vec![0u8; total];
        for frame in self.frames.lock().await.values() {
            if frame.clip_id != clip_id || frame.byte_end <= start || frame.byte_start >= end {
                continue;
            }
            let from = start.max(frame.byte_start);
            let to = end.min(frame.byte_end);
            let src =
                &frame.bytes[(from - frame.byte_start) as usize..(to - frame.byte_start) as usize];
            out[(from - start) as usize..(to - start) as usize].copy_from_slice(src);
        }
        Ok(out)
    }

    async fn clear(&self, clip_id: &str) -> Result<(), StoreError> {
        self.frames.lock().await.retain(|(id, _), _| id != clip_id);
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStores {
    async fn get(
        &self,
        clip_id: &str,
        target: &TargetKey,
    ) -> Result<Option<UploadCheckpoint>, StoreError> {
        Ok(self
            .checkpoints
            .lock()
            .await
            .get(&(clip_id.to_string(), target.as_str().to_string()))
            .cloned())
    }

    async fn put(&self, checkpoint: &UploadCheckpoint) -> Result<(), StoreError> {
        self.checkpoints.lock().await.insert(
            (
                checkpoint.clip_id.clone(),
                checkpoint.target_key.as_str().to_string(),
            ),
            checkpoint.clone(),
        );
        Ok(())
    }

    async fn clear(&self, clip_id: &str) -> Result<(), StoreError> {
        self.checkpoints
            .lock()
            .await
            .retain(|(id, _), _| id != clip_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn segments_iterate_in_sequence_order() {
        let stores = InMemoryStores::new();
        for seq in [3u64, 0, 2, 1] {
            SegmentStore::append(
                &stores,
                RawSegment::new("c", seq, seq * 10, vec![0.0; 10]),
            )
            .await
            .unwrap();
        }
        let seqs: Vec<u64> = stores
            .segments("c")
            .await
            .unwrap()
            .iter()
            .map(|s| s.seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn frame_range_read_matches_sled_semantics() {
        let stores = InMemoryStores::new();
        FrameStore::append(&stores, CompressedFrame::new("c", 0, 0, vec![7u8; 10]))
            .await
            .unwrap();
        FrameStore::append(&stores, CompressedFrame::new("c", 1, 10, vec![9u8; 10]))
            .await
            .unwrap();
        let out = FrameStore::read_range(&stores, "c", 5, 15).await.unwrap();
        assert_eq!(out, [vec![7u8; 5], vec![9u8; 5]].concat());
    }
}
