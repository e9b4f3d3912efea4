//! Upload target, strategy, and checkpoint value objects

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transfer sub-protocol selected per target capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStrategy {
    /// Server accepts explicitly-ranged writes (`Content-Range` PUTs).
    ByteRange,
    /// Three-step session protocol: init, chunk per offset, finish.
    Session,
}

impl fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ByteRange => "byte-range",
            Self::Session => "session",
        };
        write!(f, "{}", s)
    }
}

/// An upload destination: a plain endpoint URL or a paired device with a
/// bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub base_url: String,
    pub token: Option<String>,
}

impl UploadTarget {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
        }
    }

    pub fn with_token(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: Some(token.into()),
        }
    }

    /// Stable identity for checkpoint isolation.
    pub fn key(&self) -> TargetKey {
        TargetKey::from_url(&self.base_url)
    }
}

/// Normalized target identity: lowercased scheme + host + explicit port,
/// path stripped. Two URLs naming the same device collapse to one key, and
/// distinct targets never collide, so the same clip carries independent
/// checkpoints per destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetKey(String);

impl TargetKey {
    pub fn from_url(url: &str) -> Self {
        let trimmed = url.trim().trim_end_matches('/');
        let (scheme, rest) = match trimmed.split_once("://") {
            Some((s, r)) => (s.to_ascii_lowercase(), r),
            None => ("http".to_string(), trimmed),
        };
        // authority is everything before the first path separator
        let authority = rest.split('/').next().unwrap_or(rest);
        let authority = authority.to_ascii_lowercase();
        let with_port = if authority.contains(':') {
            authority
        } else {
            let port = if scheme == "https" { 443 } else { 80 };
            format!("{}:{}", authority, port)
        };
        TargetKey(format!("{}://{}", scheme, with_port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable upload progress for one (clip, target) pair.
///
/// Created lazily on the first attempt, advanced after every acknowledged
/// chunk, read at resume time to continue from `offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadCheckpoint {
    pub clip_id: String,
    pub target_key: TargetKey,
    pub strategy: Option<UploadStrategy>,
    pub offset: u64,
    pub session_id: Option<String>,
}

impl UploadCheckpoint {
    pub fn new(clip_id: impl Into<String>, target_key: TargetKey) -> Self {
        Self {
            clip_id: clip_id.into(),
            target_key,
            strategy: None,
            offset: 0,
            session_id: None,
        }
    }

    /// Advance the durable offset. Duplicate acks for an already-covered
    /// range must not move the offset backwards or past `next`.
    pub fn advance(&mut self, next: u64) {
        if next > self.offset {
            self.offset = next;
        }
    }
}
