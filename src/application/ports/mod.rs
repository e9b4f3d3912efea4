//! Port interfaces (traits) for external systems
//!
//! These traits define the boundaries between the application
//! and infrastructure layers.

pub mod audio;
pub mod config;
pub mod encoder;
pub mod pairing;
pub mod store;
pub mod transport;

// Re-export common types
pub use audio::{AudioInput, CaptureError, InputHandle, InputSession};
pub use config::{ConfigError, ConfigStore};
pub use encoder::{
    EncodeError, EncoderCommand, EncoderEvent, EncoderInit, EncoderSession, EncoderSpawner,
    PcmResampler, ResampleError,
};
pub use pairing::{PairingError, PairingGateway};
pub use store::{CheckpointStore, ClipStore, FrameStore, SegmentStore, StoreError};
pub use transport::{TransportError, UploadTransport};
