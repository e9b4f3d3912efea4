//! Audio input port interface

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Capture errors
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("No audio input device available: {0}")]
    DeviceUnavailable(String),

    #[error("Failed to start capture: {0}")]
    StartFailed(String),

    #[error("No capture session in progress")]
    NotRecording,
}

/// Handle used to halt a live input stream.
///
/// Dropping the handle also stops the stream; the adapter must release the
/// device on every exit path.
#[derive(Debug, Clone)]
pub struct InputHandle {
    stop: Arc<AtomicBool>,
}

impl InputHandle {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

impl Default for InputHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A live input stream: mono f32 buffers arrive on `segments` once per
/// device callback. The sender side never blocks the audio callback.
pub struct InputSession {
    /// Native sample rate the device was opened at.
    pub sample_rate: u32,
    /// Mono buffers in callback order. Closed when the stream halts.
    pub segments: mpsc::UnboundedReceiver<Vec<f32>>,
    pub handle: InputHandle,
}

/// Port for acquiring a live audio input stream
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Open an input stream, preferring the device named by `device_hint`
    /// (system default when `None`), at the highest available native
    /// sample rate, mono-downmixed.
    ///
    /// # Errors
    /// `DeviceUnavailable` if acquisition fails; the caller may retry with
    /// no hint to fall back to the system default.
    async fn open(&self, device_hint: Option<&str>) -> Result<InputSession, CaptureError>;
}
