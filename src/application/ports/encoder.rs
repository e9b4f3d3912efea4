//! Streaming encoder port: message protocol and session spawner
//!
//! The encoder runs isolated from capture (a dedicated thread behind the
//! adapter); communication is strictly message passing with buffer
//! ownership moving through the channels.

use thiserror::Error;
use tokio::sync::mpsc;

use super::store::StoreError;

/// Encoder session parameters. Must precede any `Encode` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInit {
    /// PCM sample rate entering the encoder. Resampling happens before the
    /// encoder, never inside it.
    pub sample_rate: u32,
    pub bitrate_kbps: u32,
    pub channels: u16,
    /// Deterministic stream tag (drives the Ogg serial) so re-encoding the
    /// same clip is byte-stable.
    pub stream_tag: u32,
}

/// Commands into an encoder session, in order.
#[derive(Debug)]
pub enum EncoderCommand {
    Init(EncoderInit),
    /// One transferable block of raw samples; boundaries need not align
    /// with codec frames.
    Encode(Vec<f32>),
    /// Flush the partial frame and terminate the session.
    Finish,
}

/// Events out of an encoder session.
#[derive(Debug)]
pub enum EncoderEvent {
    /// One completed compressed frame.
    Data(Vec<u8>),
    /// Emitted exactly once, after the final `Data`. `digest` covers the
    /// concatenation of all `Data` payloads in emission order.
    Done { digest: String, total_bytes: u64 },
    /// The session failed before `Done`; no further events follow.
    Error(String),
}

/// A live encoder session: command sender in, event receiver out.
pub struct EncoderSession {
    pub commands: mpsc::UnboundedSender<EncoderCommand>,
    pub events: mpsc::UnboundedReceiver<EncoderEvent>,
}

/// Port for spawning isolated encoder sessions
pub trait EncoderSpawner: Send + Sync {
    fn spawn(&self) -> EncoderSession;
}

/// Resampling errors
#[derive(Debug, Clone, Error)]
pub enum ResampleError {
    #[error("Resampling failed: {0}")]
    Failed(String),
}

/// Port for pre-encode resampling.
///
/// Deterministic interpolation from the device rate to the encode rate,
/// applied once before samples enter the encoder; the encoder itself never
/// resamples.
pub trait PcmResampler: Send + Sync {
    fn resample(
        &self,
        samples: Vec<f32>,
        in_rate: u32,
        out_rate: u32,
    ) -> Result<Vec<f32>, ResampleError>;
}

/// Encode pipeline errors
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Encoding failed: {0}")]
    EncoderFailed(String),

    #[error("Encoder session closed before done")]
    SessionClosed,

    #[error("No raw segments to encode for clip {0}")]
    NothingToEncode(String),

    #[error(transparent)]
    Resample(#[from] ResampleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
