//! Capture controller use case
//!
//! Owns the live audio session: pulls raw buffers off the input channel,
//! computes a live level estimate, and appends sequence-numbered segments
//! to the segment store while advancing a monotonic sample cursor. Segment
//! persistence is asynchronous relative to the device callback and must
//! never block it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{rms_level, Clip, RawSegment};

use super::ports::{AudioInput, CaptureError, ClipStore, InputHandle, SegmentStore};

struct ActiveCapture {
    clip_id: String,
    handle: InputHandle,
    task: JoinHandle<()>,
}

/// Drives one capture session at a time.
///
/// Exactly one session may be active per controller; `start` while active
/// is a no-op returning the active clip id.
pub struct CaptureController<A, S, C> {
    audio: A,
    segments: Arc<S>,
    clips: Arc<C>,
    active: Mutex<Option<ActiveCapture>>,
    level_bits: Arc<AtomicU32>,
}

impl<A, S, C> CaptureController<A, S, C>
where
    A: AudioInput,
    S: SegmentStore + 'static,
    C: ClipStore + 'static,
{
    pub fn new(audio: A, segments: Arc<S>, clips: Arc<C>) -> Self {
        Self {
            audio,
            segments,
            clips,
            active: Mutex::new(None),
            level_bits: Arc::new(AtomicU32::new(0f32.to_bits())),
        }
    }

    /// Live RMS level in `[0, 1]` for a meter. Display-only approximation.
    pub fn level(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    pub async fn is_recording(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Id of the active clip, if a session is running.
    pub async fn current_clip(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|a| a.clip_id.clone())
    }

    /// Acquire the input device and begin a capture session.
    ///
    /// The clip record is created (status `recording`) before the first
    /// segment arrives. Device acquisition failures surface as
    /// `DeviceUnavailable`; the caller may retry with no device hint to
    /// fall back to the system default.
    pub async fn start(
        &self,
        title: &str,
        device_hint: Option<&str>,
    ) -> Result<String, CaptureError> {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            debug!(clip = %current.clip_id, "capture already active, start is a no-op");
            return Ok(current.clip_id.clone());
        }

        let session = self.audio.open(device_hint).await?;

        let clip_id = uuid::Uuid::new_v4().to_string();
        let created_at_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let clip = Clip::new(&clip_id, title, session.sample_rate, 1, created_at_ms);
        self.clips
            .put(&clip)
            .await
            .map_err(|e| CaptureError::StartFailed(e.to_string()))?;

        info!(clip = %clip_id, sample_rate = session.sample_rate, "capture started");

        let segments = Arc::clone(&self.segments);
        let clips = Arc::clone(&self.clips);
        let level_bits = Arc::clone(&self.level_bits);
        let id = clip_id.clone();
        let mut rx = session.segments;

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut seq: u64 = 0;
            let mut cursor: u64 = 0;
            let mut last_duration: u64 = 0;

            while let Some(samples) = rx.recv().await {
                if samples.is_empty() {
                    continue;
                }
                level_bits.store(rms_level(&samples).to_bits(), Ordering::Relaxed);

                let segment = RawSegment::new(&id, seq, cursor, samples);
                let len = segment.len() as u64;
                match segments.append(segment).await {
                    Ok(()) => {
                        seq += 1;
                        cursor += len;
                    }
                    // Best-effort: a failed write is skipped and the cursor
                    // stays put, so the stored segments remain contiguous.
                    Err(e) => {
                        warn!(clip = %id, seq, error = %e, "segment append failed, skipping")
                    }
                }

                // Duration comes from wall-clock, not the sample count:
                // device buffering can drift.
                let elapsed = started.elapsed().as_secs();
                if elapsed != last_duration {
                    last_duration = elapsed;
                    match clips.get(&id).await {
                        Ok(Some(mut clip)) => {
                            clip.duration_seconds = elapsed;
                            if let Err(e) = clips.put(&clip).await {
                                warn!(clip = %id, error = %e, "duration update failed");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(clip = %id, error = %e, "clip read failed"),
                    }
                }
            }
            debug!(clip = %id, segments = seq, samples = cursor, "capture drained");
        });

        *active = Some(ActiveCapture {
            clip_id: clip_id.clone(),
            handle: session.handle,
            task,
        });

        Ok(clip_id)
    }

    /// Halt input, release the device, and return the clip id.
    ///
    /// Device release is guaranteed on all exit paths. The persistence
    /// task is drained before returning so every delivered buffer is
    /// durable; the caller then hands the clip to the encode pipeline
    /// (which runs in the background) and this call does not wait for it.
    pub async fn stop(&self) -> Result<String, CaptureError> {
        let capture = {
            let mut active = self.active.lock().await;
            active.take().ok_or(CaptureError::NotRecording)?
        };

        capture.handle.stop();
        if let Err(e) = capture.task.await {
            warn!(clip = %capture.clip_id, error = %e, "capture task join failed");
        }
        self.level_bits.store(0f32.to_bits(), Ordering::Relaxed);

        info!(clip = %capture.clip_id, "capture stopped");
        Ok(capture.clip_id)
    }
}
