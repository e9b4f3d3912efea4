//! Upload manager use case
//!
//! Drives one resumable transfer per (clip, target) pair: probes the
//! target's capability profile once per checkpoint lifetime, reconciles
//! the resume offset, streams chunks with retry/backoff and adaptive chunk
//! sizing, and persists the checkpoint after every acknowledged chunk so a
//! crash re-sends at most one chunk.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{Clip, TargetKey, UploadCheckpoint, UploadStrategy, UploadTarget};

use super::backoff::{next_chunk_size, next_delay, FailureKind, MAX_RETRIES};
use super::ports::{
    CheckpointStore, ClipStore, FrameStore, PairingGateway, StoreError, TransportError,
    UploadTransport,
};

/// Upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Clip not found: {0}")]
    ClipNotFound(String),

    #[error("Clip is not ready for upload: {0}")]
    NotReady(String),

    #[error("Upload rejected by target: {0}")]
    Rejected(String),

    #[error("Upload unauthorized; re-pair required")]
    Unauthorized,

    #[error("Transfer failed at offset {offset} of {total} after {attempts} attempts: {message}")]
    Transient {
        offset: u64,
        total: u64,
        attempts: u32,
        message: String,
    },

    #[error("An upload for this clip and target is already in progress")]
    AlreadyInProgress,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-chunk progress callback: `(offset, total)`.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Transfer tuning knobs.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub chunk_bytes: u64,
    pub max_file_bytes: u64,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_bytes: crate::domain::config::DEFAULT_CHUNK_BYTES,
            max_file_bytes: crate::domain::config::DEFAULT_MAX_FILE_BYTES,
        }
    }
}

/// A completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub strategy: UploadStrategy,
    pub offset: u64,
    pub total: u64,
}

type ActiveSet = Arc<StdMutex<HashSet<(String, TargetKey)>>>;

/// Removes the (clip, target) claim when the transfer loop exits, on every
/// path.
struct ActiveGuard {
    set: ActiveSet,
    key: (String, TargetKey),
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

pub struct UploadManager<T, F, C, K, P> {
    transport: T,
    frames: Arc<F>,
    clips: Arc<C>,
    checkpoints: Arc<K>,
    pairing: Option<Arc<P>>,
    options: UploadOptions,
    active: ActiveSet,
}

impl<T, F, C, K, P> UploadManager<T, F, C, K, P>
where
    T: UploadTransport,
    F: FrameStore,
    C: ClipStore,
    K: CheckpointStore,
    P: PairingGateway,
{
    pub fn new(
        transport: T,
        frames: Arc<F>,
        clips: Arc<C>,
        checkpoints: Arc<K>,
        pairing: Option<Arc<P>>,
        options: UploadOptions,
    ) -> Self {
        Self {
            transport,
            frames,
            clips,
            checkpoints,
            pairing,
            options,
            active: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    /// Transfer a ready clip to `target`, resuming from the durable
    /// checkpoint when one exists.
    ///
    /// Transfers for distinct (clip, target) pairs may run concurrently; a
    /// second call for an active pair fails with `AlreadyInProgress`.
    pub async fn upload(
        &self,
        clip_id: &str,
        target: &UploadTarget,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        let clip = self
            .clips
            .get(clip_id)
            .await?
            .ok_or_else(|| UploadError::ClipNotFound(clip_id.to_string()))?;
        if !clip.is_ready() {
            return Err(UploadError::NotReady(clip_id.to_string()));
        }

        // The frame store is the source of truth for the byte length.
        let total = self.frames.total_bytes(clip_id).await?;
        if total == 0 {
            return Err(UploadError::NotReady(clip_id.to_string()));
        }
        if total > self.options.max_file_bytes {
            return Err(UploadError::Rejected(format!(
                "clip is {} bytes, limit is {}",
                total, self.options.max_file_bytes
            )));
        }

        let target_key = target.key();
        let _guard = self.claim(clip_id, &target_key)?;

        let mut checkpoint = self
            .checkpoints
            .get(clip_id, &target_key)
            .await?
            .unwrap_or_else(|| UploadCheckpoint::new(clip_id, target_key.clone()));

        // Probe once per checkpoint lifetime.
        let strategy = match checkpoint.strategy {
            Some(strategy) => strategy,
            None => {
                let strategy = match self.transport.probe(target).await {
                    Ok(strategy) => strategy,
                    Err(e) => {
                        debug!(error = %e, "capability probe failed, assuming session profile");
                        UploadStrategy::Session
                    }
                };
                checkpoint.strategy = Some(strategy);
                self.checkpoints.put(&checkpoint).await?;
                strategy
            }
        };

        info!(
            clip = %clip_id,
            target = %target_key,
            %strategy,
            offset = checkpoint.offset,
            total,
            "upload starting"
        );

        match strategy {
            UploadStrategy::ByteRange => {
                self.run_byte_range(&clip, target, checkpoint, total, on_progress)
                    .await
            }
            UploadStrategy::Session => {
                self.run_session(&clip, target, checkpoint, total, on_progress)
                    .await
            }
        }
    }

    fn claim(&self, clip_id: &str, target_key: &TargetKey) -> Result<ActiveGuard, UploadError> {
        let key = (clip_id.to_string(), target_key.clone());
        let mut set = self
            .active
            .lock()
            .map_err(|_| UploadError::AlreadyInProgress)?;
        if !set.insert(key.clone()) {
            return Err(UploadError::AlreadyInProgress);
        }
        Ok(ActiveGuard {
            set: Arc::clone(&self.active),
            key,
        })
    }

    async fn run_byte_range(
        &self,
        clip: &Clip,
        target: &UploadTarget,
        mut checkpoint: UploadCheckpoint,
        total: u64,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        // The authoritative resume point is the max of what the target
        // reports and the local checkpoint: the checkpoint may be stale
        // (acked on the wire, crash before persist), but never ahead of
        // the target.
        match self.transport.remote_offset(target).await {
            Ok(Some(remote)) => {
                if remote > checkpoint.offset {
                    debug!(
                        clip = %clip.id,
                        local = checkpoint.offset,
                        remote,
                        "target is ahead of local checkpoint, resuming from remote offset"
                    );
                }
                checkpoint.advance(remote.min(total));
                self.checkpoints.put(&checkpoint).await?;
            }
            Ok(None) => {}
            Err(TransportError::Unauthorized) => {
                self.handle_auth_loss(target).await;
                return Err(UploadError::Unauthorized);
            }
            Err(e) => debug!(error = %e, "offset query failed, using local checkpoint"),
        }

        let digest = non_empty(&clip.digest);
        let result = self
            .chunk_loop(clip, total, checkpoint, on_progress, |offset, end, body| {
                self.transport
                    .put_range(target, offset, end, total, digest, body)
            })
            .await;

        match result {
            Ok(offset) => Ok(UploadOutcome {
                strategy: UploadStrategy::ByteRange,
                offset,
                total,
            }),
            Err(e) => Err(self.fail_upload(e, target).await),
        }
    }

    async fn run_session(
        &self,
        clip: &Clip,
        target: &UploadTarget,
        mut checkpoint: UploadCheckpoint,
        total: u64,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        let digest = non_empty(&clip.digest);

        let session_id = match checkpoint.session_id.clone() {
            Some(id) => id,
            None => {
                let init = self
                    .call_with_retry(|| {
                        self.transport
                            .init_session(target, total, digest, &clip.filename)
                    })
                    .await;
                let id = match init {
                    Ok(id) => id,
                    Err(e) => {
                        let e = self.classify(e, 0, total);
                        return Err(self.fail_upload(e, target).await);
                    }
                };
                checkpoint.session_id = Some(id.clone());
                checkpoint.offset = 0;
                self.checkpoints.put(&checkpoint).await?;
                id
            }
        };

        let loop_result = self
            .chunk_loop(clip, total, checkpoint, on_progress, |offset, _end, body| {
                self.transport.put_chunk(target, &session_id, offset, body)
            })
            .await;
        let offset = match loop_result {
            Ok(offset) => offset,
            Err(e) => return Err(self.fail_upload(e, target).await),
        };

        // The transfer is only complete once the target validates size and
        // digest.
        let finish = self
            .call_with_retry(|| {
                self.transport
                    .finish_session(target, &session_id, total, digest)
            })
            .await;
        if let Err(e) = finish {
            let e = self.classify(e, offset, total);
            return Err(self.fail_upload(e, target).await);
        }

        Ok(UploadOutcome {
            strategy: UploadStrategy::Session,
            offset,
            total,
        })
    }

    /// The chunked transfer loop shared by both strategies. `send` writes
    /// one chunk `[offset, end)`; on ack the checkpoint is persisted
    /// before the next chunk is read.
    async fn chunk_loop<'a, Fut, SendFn>(
        &'a self,
        clip: &'a Clip,
        total: u64,
        mut checkpoint: UploadCheckpoint,
        on_progress: Option<ProgressCallback>,
        send: SendFn,
    ) -> Result<u64, UploadError>
    where
        SendFn: Fn(u64, u64, Vec<u8>) -> Fut + 'a,
        Fut: std::future::Future<Output = Result<(), TransportError>>,
    {
        // The floor only bounds adaptive shrinking; a smaller configured
        // chunk size is honored as-is.
        let mut offset = checkpoint.offset.min(total);
        let mut chunk_bytes = self.options.chunk_bytes.max(1);
        let mut attempt: u32 = 0;

        while offset < total {
            let end = total.min(offset + chunk_bytes);
            let body = self.frames.read_range(&clip.id, offset, end).await?;

            match send(offset, end, body).await {
                Ok(()) => {
                    attempt = 0;
                    offset = end;
                    checkpoint.advance(end);
                    self.checkpoints.put(&checkpoint).await?;
                    if let Some(cb) = &on_progress {
                        cb(offset, total);
                    }
                }
                Err(e) => {
                    let failure = match &e {
                        TransportError::Timeout => Some(FailureKind::Timeout),
                        TransportError::Transient(_) => Some(FailureKind::Transient),
                        _ => None,
                    };
                    let Some(failure) = failure else {
                        return Err(self.classify(e, offset, total));
                    };
                    if attempt >= MAX_RETRIES {
                        return Err(UploadError::Transient {
                            offset,
                            total,
                            attempts: attempt + 1,
                            message: e.to_string(),
                        });
                    }
                    // Adapt before the next attempt; the retried range is
                    // re-read at the (possibly smaller) size.
                    chunk_bytes = next_chunk_size(chunk_bytes, failure);
                    let delay = next_delay(attempt);
                    warn!(
                        clip = %clip.id,
                        offset,
                        attempt,
                        chunk_bytes,
                        error = %e,
                        "chunk failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }

        Ok(offset)
    }

    /// Retry wrapper for the non-chunk calls (init, finish).
    async fn call_with_retry<V, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> Result<V, TransportError>
    where
        Fut: std::future::Future<Output = Result<V, TransportError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    tokio::time::sleep(next_delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn classify(&self, error: TransportError, offset: u64, total: u64) -> UploadError {
        match error {
            TransportError::Unauthorized => UploadError::Unauthorized,
            TransportError::Rejected { status, message } => {
                UploadError::Rejected(format!("HTTP {}: {}", status, message))
            }
            other => UploadError::Transient {
                offset,
                total,
                attempts: MAX_RETRIES + 1,
                message: other.to_string(),
            },
        }
    }

    /// On auth loss against a paired target, drop the stored credential
    /// immediately so the caller re-pairs instead of retrying a dead
    /// token.
    async fn fail_upload(&self, error: UploadError, target: &UploadTarget) -> UploadError {
        if matches!(error, UploadError::Unauthorized) {
            self.handle_auth_loss(target).await;
        }
        error
    }

    async fn handle_auth_loss(&self, target: &UploadTarget) {
        if target.token.is_none() {
            return;
        }
        if let Some(pairing) = &self.pairing {
            match pairing.invalidate_token().await {
                Ok(()) => info!("pairing credentials invalidated; re-pair required"),
                Err(e) => warn!(error = %e, "failed to invalidate pairing credentials"),
            }
        }
    }
}

fn non_empty(digest: &str) -> Option<&str> {
    if digest.is_empty() {
        None
    } else {
        Some(digest)
    }
}
