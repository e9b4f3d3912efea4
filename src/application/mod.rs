//! Application layer - Use cases and port interfaces
//!
//! Contains the core pipeline operations and trait definitions
//! for external system interactions.

pub mod backoff;
pub mod capture;
pub mod encode;
pub mod ports;
pub mod upload;

// Re-export use cases
pub use capture::CaptureController;
pub use encode::EncodePipeline;
pub use upload::{UploadError, UploadManager, UploadOptions, UploadOutcome};
