//! Encode pipeline use case
//!
//! Consumes a clip's raw segments in order, resamples once to the encode
//! rate, streams PCM chunks to an isolated encoder session, and appends
//! each emitted compressed frame to the frame store. On `done` the clip
//! becomes ready and the raw segments are deleted; if the session errors
//! first, the raw segments are preserved and a degraded single-shot encode
//! is attempted from the fully-assembled buffer.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{sanitize_filename, Clip, ClipStatus, CompressedFrame};

use super::ports::{
    ClipStore, EncodeError, EncoderCommand, EncoderEvent, EncoderInit, EncoderSpawner, FrameStore,
    PcmResampler, SegmentStore, StoreError,
};

/// Sample rates the codec accepts directly; anything else is resampled to
/// the highest.
const SUPPORTED_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];
const FALLBACK_RATE: u32 = 48000;

/// Pick the rate PCM enters the encoder at.
pub fn encode_rate_for(device_rate: u32) -> u32 {
    if SUPPORTED_RATES.contains(&device_rate) {
        device_rate
    } else {
        FALLBACK_RATE
    }
}

/// Deterministic stream tag for a clip, so re-encoding the same clip
/// produces byte-identical output. FNV-1a over the id.
pub fn stream_tag(clip_id: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for byte in clip_id.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

pub struct EncodePipeline<S, F, C, E, R> {
    segments: Arc<S>,
    frames: Arc<F>,
    clips: Arc<C>,
    encoder: Arc<E>,
    resampler: Arc<R>,
    bitrate_kbps: u32,
}

impl<S, F, C, E, R> EncodePipeline<S, F, C, E, R>
where
    S: SegmentStore + 'static,
    F: FrameStore + 'static,
    C: ClipStore + 'static,
    E: EncoderSpawner + 'static,
    R: PcmResampler + 'static,
{
    pub fn new(
        segments: Arc<S>,
        frames: Arc<F>,
        clips: Arc<C>,
        encoder: Arc<E>,
        resampler: Arc<R>,
        bitrate_kbps: u32,
    ) -> Self {
        Self {
            segments,
            frames,
            clips,
            encoder,
            resampler,
            bitrate_kbps,
        }
    }

    /// Background hand-off: encode after capture stops without making the
    /// caller wait.
    pub fn spawn(self: &Arc<Self>, clip_id: String) -> JoinHandle<Result<(), EncodeError>> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run_with_fallback(&clip_id).await })
    }

    /// Streaming encode, falling back to a single-shot pass when the
    /// session fails. Raw segments survive until a successful `done`, so
    /// the fallback (and any later retry) re-runs from them.
    pub async fn run_with_fallback(&self, clip_id: &str) -> Result<(), EncodeError> {
        match self.run(clip_id).await {
            Err(EncodeError::EncoderFailed(msg)) => {
                warn!(clip = %clip_id, error = %msg, "streaming encode failed, trying single-shot");
                self.run_single_shot(clip_id).await
            }
            Err(EncodeError::SessionClosed) => {
                warn!(clip = %clip_id, "encoder session closed, trying single-shot");
                self.run_single_shot(clip_id).await
            }
            other => other,
        }
    }

    /// Streaming encode: chunked input, chunked compressed output.
    pub async fn run(&self, clip_id: &str) -> Result<(), EncodeError> {
        let (clip, pcm, rate) = match self.prepare(clip_id).await? {
            Some(prepared) => prepared,
            None => return Ok(()),
        };

        // ~20 codec frames per protocol chunk; boundaries are arbitrary on
        // purpose, the encoder re-frames internally.
        let chunk_len = (rate as usize / 50) * 20;
        let session = self.encoder.spawn();

        session
            .commands
            .send(EncoderCommand::Init(EncoderInit {
                sample_rate: rate,
                bitrate_kbps: self.bitrate_kbps,
                channels: 1,
                stream_tag: stream_tag(clip_id),
            }))
            .map_err(|_| EncodeError::SessionClosed)?;

        for chunk in pcm.chunks(chunk_len.max(1)) {
            session
                .commands
                .send(EncoderCommand::Encode(chunk.to_vec()))
                .map_err(|_| EncodeError::SessionClosed)?;
        }
        session
            .commands
            .send(EncoderCommand::Finish)
            .map_err(|_| EncodeError::SessionClosed)?;

        self.consume(clip, session.events).await
    }

    /// Degraded fallback: the fully-assembled buffer in one `encode` call.
    /// No streaming and no resumability of the encode step itself.
    async fn run_single_shot(&self, clip_id: &str) -> Result<(), EncodeError> {
        let (clip, pcm, rate) = match self.prepare(clip_id).await? {
            Some(prepared) => prepared,
            None => return Ok(()),
        };

        let session = self.encoder.spawn();
        session
            .commands
            .send(EncoderCommand::Init(EncoderInit {
                sample_rate: rate,
                bitrate_kbps: self.bitrate_kbps,
                channels: 1,
                stream_tag: stream_tag(clip_id),
            }))
            .map_err(|_| EncodeError::SessionClosed)?;
        session
            .commands
            .send(EncoderCommand::Encode(pcm))
            .map_err(|_| EncodeError::SessionClosed)?;
        session
            .commands
            .send(EncoderCommand::Finish)
            .map_err(|_| EncodeError::SessionClosed)?;

        self.consume(clip, session.events).await
    }

    /// Assemble and resample the clip's raw PCM. Returns `None` when the
    /// clip is already ready (re-encode is a no-op once segments are gone).
    async fn prepare(
        &self,
        clip_id: &str,
    ) -> Result<Option<(Clip, Vec<f32>, u32)>, EncodeError> {
        let mut clip = self
            .clips
            .get(clip_id)
            .await?
            .ok_or_else(|| StoreError::ClipNotFound(clip_id.to_string()))?;
        if clip.is_ready() {
            debug!(clip = %clip_id, "already encoded");
            return Ok(None);
        }

        let total = self.segments.total_samples(clip_id).await?;
        if total == 0 {
            return Err(EncodeError::NothingToEncode(clip_id.to_string()));
        }
        let pcm = self.segments.read_range(clip_id, 0, total).await?;

        // A retried encode starts from a clean frame log and size.
        self.frames.clear(clip_id).await?;
        clip.size_bytes = 0;

        let device_rate = clip.sample_rate;
        let rate = encode_rate_for(device_rate);
        let pcm = if device_rate == rate {
            pcm
        } else {
            let resampler = Arc::clone(&self.resampler);
            tokio::task::spawn_blocking(move || resampler.resample(pcm, device_rate, rate))
                .await
                .map_err(|e| EncodeError::EncoderFailed(format!("resample task: {}", e)))??
        };

        Ok(Some((clip, pcm, rate)))
    }

    /// Drain encoder events into compressed frames and finalize on `done`.
    async fn consume(
        &self,
        mut clip: Clip,
        mut events: tokio::sync::mpsc::UnboundedReceiver<EncoderEvent>,
    ) -> Result<(), EncodeError> {
        let clip_id = clip.id.clone();
        let mut seq: u64 = 0;
        let mut byte_offset: u64 = 0;

        while let Some(event) = events.recv().await {
            match event {
                EncoderEvent::Data(bytes) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    let frame = CompressedFrame::new(&clip_id, seq, byte_offset, bytes);
                    byte_offset = frame.byte_end;
                    seq += 1;
                    self.frames.append(frame).await?;
                    // The frame store is the source of truth for size; the
                    // clip record tracks the running max.
                    if byte_offset > clip.size_bytes {
                        clip.size_bytes = byte_offset;
                        self.clips.put(&clip).await?;
                    }
                }
                EncoderEvent::Done { digest, total_bytes } => {
                    clip.status = ClipStatus::Ready;
                    clip.size_bytes = total_bytes;
                    clip.digest = digest;
                    clip.filename = sanitize_filename(&clip.title, chrono::Local::now());
                    self.clips.put(&clip).await?;
                    // Compressed frames are now authoritative.
                    self.segments.clear(&clip_id).await?;
                    info!(
                        clip = %clip_id,
                        size_bytes = total_bytes,
                        frames = seq,
                        "encode complete"
                    );
                    return Ok(());
                }
                EncoderEvent::Error(msg) => {
                    return Err(EncodeError::EncoderFailed(msg));
                }
            }
        }
        Err(EncodeError::SessionClosed)
    }
}
