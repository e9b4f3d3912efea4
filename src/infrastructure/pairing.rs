//! File-backed pairing credentials
//!
//! The pairing handshake happens elsewhere; this adapter persists the
//! resulting device URL and bearer token under the config directory and
//! serves them through the PairingGateway port. An expired or invalidated
//! token simply yields no target, forcing a re-pair.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::application::ports::{PairingError, PairingGateway};
use crate::domain::UploadTarget;

/// Stored pairing record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PairingRecord {
    device: Option<String>,
    token: Option<String>,
    /// Unix millis after which the token is dead.
    expires_at_ms: Option<u64>,
}

/// Pairing credentials persisted as TOML in the config directory.
pub struct FilePairingStore {
    path: PathBuf,
}

impl FilePairingStore {
    /// Create a store at the default path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("storycap");

        Self {
            path: config_dir.join("device.toml"),
        }
    }

    /// Create with custom path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.path.clone()
    }

    async fn load(&self) -> Result<PairingRecord, PairingError> {
        if !self.path.exists() {
            return Ok(PairingRecord::default());
        }
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| PairingError::ReadFailed(e.to_string()))?;
        toml::from_str(&content).map_err(|e| PairingError::ReadFailed(e.to_string()))
    }

    async fn save(&self, record: &PairingRecord) -> Result<(), PairingError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PairingError::WriteFailed(e.to_string()))?;
        }
        let content =
            toml::to_string_pretty(record).map_err(|e| PairingError::WriteFailed(e.to_string()))?;
        fs::write(&self.path, content)
            .await
            .map_err(|e| PairingError::WriteFailed(e.to_string()))
    }

    /// Store a fresh pairing (device URL, token, optional ttl in seconds).
    pub async fn save_pairing(
        &self,
        device: &str,
        token: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<(), PairingError> {
        let expires_at_ms = ttl_seconds.map(|ttl| {
            chrono::Utc::now().timestamp_millis().max(0) as u64 + ttl * 1000
        });
        let record = PairingRecord {
            device: Some(device.trim_end_matches('/').to_string()),
            token: Some(token.to_string()),
            expires_at_ms,
        };
        self.save(&record).await?;
        info!(device, "pairing credentials saved");
        Ok(())
    }

    /// Drop the whole pairing record.
    pub async fn clear(&self) -> Result<(), PairingError> {
        self.save(&PairingRecord::default()).await
    }
}

impl Default for FilePairingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PairingGateway for FilePairingStore {
    async fn current_target(&self) -> Result<Option<UploadTarget>, PairingError> {
        let record = self.load().await?;
        let (Some(device), Some(token)) = (record.device, record.token) else {
            return Ok(None);
        };
        if let Some(expires) = record.expires_at_ms {
            let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
            if now > expires {
                return Ok(None);
            }
        }
        Ok(Some(UploadTarget::with_token(device, token)))
    }

    async fn invalidate_token(&self) -> Result<(), PairingError> {
        let mut record = self.load().await?;
        record.token = None;
        record.expires_at_ms = None;
        self.save(&record).await?;
        info!("pairing token invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (FilePairingStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePairingStore::with_path(dir.path().join("device.toml"));
        (store, dir)
    }

    #[tokio::test]
    async fn save_then_load_round_trip() {
        let (store, _dir) = temp_store();
        store
            .save_pairing("http://device.local:8080/", "tok-1", None)
            .await
            .unwrap();

        let target = store.current_target().await.unwrap().unwrap();
        assert_eq!(target.base_url, "http://device.local:8080");
        assert_eq!(target.token.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn missing_file_means_no_target() {
        let (store, _dir) = temp_store();
        assert!(store.current_target().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_drops_the_token_but_keeps_the_device() {
        let (store, _dir) = temp_store();
        store
            .save_pairing("http://device.local", "tok-1", Some(3600))
            .await
            .unwrap();

        store.invalidate_token().await.unwrap();
        assert!(store.current_target().await.unwrap().is_none());

        let record = store.load().await.unwrap();
        assert_eq!(record.device.as_deref(), Some("http://device.local"));
        assert!(record.token.is_none());
    }

    #[tokio::test]
    async fn expired_token_yields_no_target() {
        let (store, _dir) = temp_store();
        store
            .save_pairing("http://device.local", "tok-1", Some(0))
            .await
            .unwrap();
        // ttl 0 expires immediately (same millisecond edge aside)
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(store.current_target().await.unwrap().is_none());
    }
}
