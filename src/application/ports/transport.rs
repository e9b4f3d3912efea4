//! Upload transport port interface
//!
//! A thin request/response boundary over the two server capability
//! profiles. The transport performs single calls; retry, backoff, and
//! checkpointing live in the upload manager.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{UploadStrategy, UploadTarget};

/// Transport errors, classified for the retry policy.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// 401/403 from a paired target. Never retried; triggers credential
    /// invalidation upstream.
    #[error("Upload unauthorized by target")]
    Unauthorized,

    /// Non-retryable client rejection (payload too large, malformed, ...).
    #[error("Upload rejected by target: HTTP {status} {message}")]
    Rejected { status: u16, message: String },

    /// Server error or connection failure; retried with backoff.
    #[error("Transient transfer failure: {0}")]
    Transient(String),

    /// The bounded request timeout elapsed; the call was aborted. Retried,
    /// and the chunk size adapts down.
    #[error("Request timed out")]
    Timeout,
}

impl TransportError {
    /// Whether the retry budget applies to this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout)
    }
}

/// Port for the resumable transfer wire calls
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Capability probe (HEAD). `Accept-Ranges: bytes` selects the
    /// byte-range strategy.
    async fn probe(&self, target: &UploadTarget) -> Result<UploadStrategy, TransportError>;

    /// Received-byte offset the target reports for the byte-range
    /// strategy (`Content-Length` / `X-Upload-Offset`), if any.
    async fn remote_offset(&self, target: &UploadTarget) -> Result<Option<u64>, TransportError>;

    /// Byte-range strategy: write `[start, end)` of `total` declared bytes.
    async fn put_range(
        &self,
        target: &UploadTarget,
        start: u64,
        end: u64,
        total: u64,
        digest: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Session strategy: open an upload session, returning its id.
    async fn init_session(
        &self,
        target: &UploadTarget,
        size_bytes: u64,
        digest: Option<&str>,
        filename: &str,
    ) -> Result<String, TransportError>;

    /// Session strategy: write one chunk at an explicit offset.
    async fn put_chunk(
        &self,
        target: &UploadTarget,
        session_id: &str,
        offset: u64,
        body: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Session strategy: finalize; the target validates size and digest.
    async fn finish_session(
        &self,
        target: &UploadTarget,
        session_id: &str,
        size_bytes: u64,
        digest: Option<&str>,
    ) -> Result<(), TransportError>;
}
