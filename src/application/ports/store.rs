//! Durable store port interfaces
//!
//! Append-only, time-ordered storage keyed by (clip, sequence) with range
//! reads by sample or byte offset. Opened lazily, torn down only on clip
//! deletion.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Clip, CompressedFrame, RawSegment, TargetKey, UploadCheckpoint};

/// Store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store write failed: {0}")]
    WriteFailed(String),

    #[error("Store read failed: {0}")]
    ReadFailed(String),

    #[error("Clip not found: {0}")]
    ClipNotFound(String),

    #[error("Corrupt store record: {0}")]
    Corrupt(String),
}

/// Port for clip metadata records
#[async_trait]
pub trait ClipStore: Send + Sync {
    /// Insert or replace a clip record.
    async fn put(&self, clip: &Clip) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Clip>, StoreError>;

    /// All clips, newest first.
    async fn list(&self) -> Result<Vec<Clip>, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Port for raw PCM segments, ordered by sequence per clip
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Append one segment. Sequence and sample range are assigned by the
    /// capture controller; the store never reorders.
    async fn append(&self, segment: RawSegment) -> Result<(), StoreError>;

    /// Total samples covered by the clip's segments (max `sample_end`).
    async fn total_samples(&self, clip_id: &str) -> Result<u64, StoreError>;

    /// Reassemble `[start_sample, end_sample)` exactly, in sample order.
    async fn read_range(
        &self,
        clip_id: &str,
        start_sample: u64,
        end_sample: u64,
    ) -> Result<Vec<f32>, StoreError>;

    /// All segments for a clip in sequence order.
    async fn segments(&self, clip_id: &str) -> Result<Vec<RawSegment>, StoreError>;

    /// Bulk-delete every segment of a clip.
    async fn clear(&self, clip_id: &str) -> Result<(), StoreError>;
}

/// Port for compressed frames, ordered by sequence per clip
#[async_trait]
pub trait FrameStore: Send + Sync {
    async fn append(&self, frame: CompressedFrame) -> Result<(), StoreError>;

    /// Total encoded bytes (max `byte_end`). Source of truth for a clip's
    /// size.
    async fn total_bytes(&self, clip_id: &str) -> Result<u64, StoreError>;

    /// Reassemble `[start, end)` of the encoded byte stream.
    async fn read_range(&self, clip_id: &str, start: u64, end: u64)
        -> Result<Vec<u8>, StoreError>;

    async fn clear(&self, clip_id: &str) -> Result<(), StoreError>;
}

/// Port for per-(clip, target) upload checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(
        &self,
        clip_id: &str,
        target: &TargetKey,
    ) -> Result<Option<UploadCheckpoint>, StoreError>;

    async fn put(&self, checkpoint: &UploadCheckpoint) -> Result<(), StoreError>;

    /// Drop every checkpoint for a clip (on clip deletion).
    async fn clear(&self, clip_id: &str) -> Result<(), StoreError>;
}
