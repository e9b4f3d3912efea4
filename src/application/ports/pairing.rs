//! Pairing gateway port interface
//!
//! The pairing handshake itself is an external collaborator; this port
//! only reads the current paired target and invalidates a dead credential.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::UploadTarget;

/// Pairing errors
#[derive(Debug, Clone, Error)]
pub enum PairingError {
    #[error("Failed to read pairing credentials: {0}")]
    ReadFailed(String),

    #[error("Failed to update pairing credentials: {0}")]
    WriteFailed(String),
}

/// Port for the paired-device credential collaborator
#[async_trait]
pub trait PairingGateway: Send + Sync {
    /// The currently paired target (URL + bearer token), if any and not
    /// expired.
    async fn current_target(&self) -> Result<Option<UploadTarget>, PairingError>;

    /// Drop the stored token immediately so the caller is forced to
    /// re-pair instead of retrying a dead credential.
    async fn invalidate_token(&self) -> Result<(), PairingError>;
}
