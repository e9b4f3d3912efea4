//! Infrastructure layer - Adapter implementations
//!
//! Contains concrete implementations of the port interfaces,
//! integrating with external systems: cpal, the Opus codec, sled,
//! the HTTP transport, and the filesystem.

pub mod audio;
pub mod config;
pub mod encoding;
pub mod pairing;
pub mod resample;
pub mod store;
pub mod upload;

// Re-export adapters
pub use audio::CpalAudioInput;
pub use config::XdgConfigStore;
pub use encoding::{OpusStreamEncoder, ThreadedOpusSpawner};
pub use pairing::FilePairingStore;
pub use resample::RubatoResampler;
pub use store::{InMemoryStores, SledStores};
pub use upload::HttpTransport;
