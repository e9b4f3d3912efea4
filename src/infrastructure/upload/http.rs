//! HTTP upload transport using reqwest
//!
//! One adapter serves both target shapes: a plain endpoint and a paired
//! device. The only differences are the optional bearer token and the
//! `X-Upload-Offset` header some devices report; both are handled
//! uniformly here. Single calls only; retry and checkpointing live in the
//! upload manager.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::application::backoff::REQUEST_TIMEOUT;
use crate::application::ports::{TransportError, UploadTransport};
use crate::domain::{UploadStrategy, UploadTarget};

const CONTENT_TYPE_AUDIO: &str = "audio/ogg";

// Request/response bodies for the session (three-step) profile

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitRequest<'a> {
    size_bytes: u64,
    md5: Option<&'a str>,
    filename: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitResponse {
    upload_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FinishRequest<'a> {
    upload_id: &'a str,
    size_bytes: u64,
    md5: Option<&'a str>,
}

/// Reqwest-backed implementation of the transport port.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn base(target: &UploadTarget) -> &str {
        target.base_url.trim_end_matches('/')
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: String,
        target: &UploadTarget,
    ) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url).timeout(REQUEST_TIMEOUT);
        if let Some(token) = &target.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    fn network_error(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Transient(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::Unauthorized);
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(TransportError::Transient(format!("HTTP {}", status)));
        }
        let message = response.text().await.unwrap_or_default();
        Err(TransportError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    fn header_u64(response: &reqwest::Response, name: &str) -> Option<u64> {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn probe(&self, target: &UploadTarget) -> Result<UploadStrategy, TransportError> {
        let response = self
            .request(reqwest::Method::HEAD, Self::base(target).to_string(), target)
            .send()
            .await
            .map_err(Self::network_error)?;

        let ranges = response
            .headers()
            .get(reqwest::header::ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if ranges.to_lowercase().contains("bytes") {
            Ok(UploadStrategy::ByteRange)
        } else {
            Ok(UploadStrategy::Session)
        }
    }

    async fn remote_offset(&self, target: &UploadTarget) -> Result<Option<u64>, TransportError> {
        let response = self
            .request(reqwest::Method::HEAD, Self::base(target).to_string(), target)
            .send()
            .await
            .map_err(Self::network_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::Unauthorized);
        }
        if !status.is_success() {
            // A target that cannot report its offset is not fatal; the
            // local checkpoint stands.
            return Ok(None);
        }

        let length = Self::header_u64(&response, "content-length");
        let offset = Self::header_u64(&response, "x-upload-offset");
        Ok(match (length, offset) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        })
    }

    async fn put_range(
        &self,
        target: &UploadTarget,
        start: u64,
        end: u64,
        total: u64,
        digest: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), TransportError> {
        let mut builder = self
            .request(reqwest::Method::PUT, Self::base(target).to_string(), target)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_AUDIO)
            .header(
                reqwest::header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end - 1, total),
            );
        if let Some(digest) = digest {
            builder = builder.header("content-md5", digest);
        }

        let response = builder
            .body(body)
            .send()
            .await
            .map_err(Self::network_error)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn init_session(
        &self,
        target: &UploadTarget,
        size_bytes: u64,
        digest: Option<&str>,
        filename: &str,
    ) -> Result<String, TransportError> {
        let url = format!("{}/init", Self::base(target));
        let response = self
            .request(reqwest::Method::POST, url, target)
            .json(&InitRequest {
                size_bytes,
                md5: digest,
                filename,
            })
            .send()
            .await
            .map_err(Self::network_error)?;
        let response = Self::check_status(response).await?;

        let init: InitResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Transient(format!("init response: {}", e)))?;
        Ok(init.upload_id)
    }

    async fn put_chunk(
        &self,
        target: &UploadTarget,
        session_id: &str,
        offset: u64,
        body: Vec<u8>,
    ) -> Result<(), TransportError> {
        let url = format!("{}/chunk", Self::base(target));
        let offset_value = offset.to_string();
        let response = self
            .request(reqwest::Method::PUT, url, target)
            .query(&[("uploadId", session_id), ("offset", offset_value.as_str())])
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/octet-stream",
            )
            .body(body)
            .send()
            .await
            .map_err(Self::network_error)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn finish_session(
        &self,
        target: &UploadTarget,
        session_id: &str,
        size_bytes: u64,
        digest: Option<&str>,
    ) -> Result<(), TransportError> {
        let url = format!("{}/finish", Self::base(target));
        let response = self
            .request(reqwest::Method::POST, url, target)
            .json(&FinishRequest {
                upload_id: session_id,
                size_bytes,
                md5: digest,
            })
            .send()
            .await
            .map_err(Self::network_error)?;
        Self::check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_request_uses_wire_field_names() {
        let body = serde_json::to_value(InitRequest {
            size_bytes: 1234,
            md5: Some("abc"),
            filename: "clip.ogg",
        })
        .unwrap();
        assert_eq!(body["sizeBytes"], 1234);
        assert_eq!(body["md5"], "abc");
        assert_eq!(body["filename"], "clip.ogg");
    }

    #[test]
    fn init_request_serializes_missing_digest_as_null() {
        let body = serde_json::to_value(InitRequest {
            size_bytes: 1,
            md5: None,
            filename: "clip.ogg",
        })
        .unwrap();
        assert!(body["md5"].is_null());
    }

    #[test]
    fn base_strips_trailing_slash() {
        let target = UploadTarget::new("http://device.local:8080/");
        assert_eq!(HttpTransport::base(&target), "http://device.local:8080");
    }
}
