//! Application configuration value object

use serde::{Deserialize, Serialize};

/// Default chunk size for upload transfers (bytes).
pub const DEFAULT_CHUNK_BYTES: u64 = 32768;

/// Upper bound on a single clip's compressed size for upload.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 52428800;

/// Default Opus bitrate in kbit/s.
pub const DEFAULT_BITRATE_KBPS: u32 = 64;

/// Application configuration.
/// All fields are optional to support partial configs and merging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upload endpoint base URL (plain server, not a paired device).
    pub endpoint: Option<String>,
    /// Upload chunk size in bytes.
    pub chunk_bytes: Option<u64>,
    /// Reject uploads of clips larger than this many bytes.
    pub max_file_bytes: Option<u64>,
    /// Opus encode bitrate in kbit/s.
    pub bitrate_kbps: Option<u32>,
    /// Override for the sled database directory.
    pub data_dir: Option<String>,
}

impl AppConfig {
    /// Create config with default values
    pub fn defaults() -> Self {
        Self {
            endpoint: None,
            chunk_bytes: Some(DEFAULT_CHUNK_BYTES),
            max_file_bytes: Some(DEFAULT_MAX_FILE_BYTES),
            bitrate_kbps: Some(DEFAULT_BITRATE_KBPS),
            data_dir: None,
        }
    }

    /// Create an empty config (all None)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge this config with another, where other takes precedence.
    /// Only non-None values from other will override this.
    pub fn merge(self, other: Self) -> Self {
        Self {
            endpoint: other.endpoint.or(self.endpoint),
            chunk_bytes: other.chunk_bytes.or(self.chunk_bytes),
            max_file_bytes: other.max_file_bytes.or(self.max_file_bytes),
            bitrate_kbps: other.bitrate_kbps.or(self.bitrate_kbps),
            data_dir: other.data_dir.or(self.data_dir),
        }
    }

    pub fn chunk_bytes_or_default(&self) -> u64 {
        self.chunk_bytes.unwrap_or(DEFAULT_CHUNK_BYTES)
    }

    pub fn max_file_bytes_or_default(&self) -> u64 {
        self.max_file_bytes.unwrap_or(DEFAULT_MAX_FILE_BYTES)
    }

    pub fn bitrate_kbps_or_default(&self) -> u32 {
        self.bitrate_kbps.unwrap_or(DEFAULT_BITRATE_KBPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_transfer_knobs() {
        let config = AppConfig::defaults();
        assert_eq!(config.chunk_bytes, Some(DEFAULT_CHUNK_BYTES));
        assert_eq!(config.max_file_bytes, Some(DEFAULT_MAX_FILE_BYTES));
        assert_eq!(config.bitrate_kbps, Some(DEFAULT_BITRATE_KBPS));
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn merge_prefers_other() {
        let base = AppConfig {
            endpoint: Some("http://a".into()),
            chunk_bytes: Some(1024),
            ..Default::default()
        };
        let other = AppConfig {
            endpoint: Some("http://b".into()),
            bitrate_kbps: Some(96),
            ..Default::default()
        };
        let merged = base.merge(other);
        assert_eq!(merged.endpoint.as_deref(), Some("http://b"));
        assert_eq!(merged.chunk_bytes, Some(1024));
        assert_eq!(merged.bitrate_kbps, Some(96));
    }

    #[test]
    fn accessors_fall_back_to_defaults() {
        let config = AppConfig::empty();
        assert_eq!(config.chunk_bytes_or_default(), DEFAULT_CHUNK_BYTES);
        assert_eq!(config.bitrate_kbps_or_default(), DEFAULT_BITRATE_KBPS);
    }
}
