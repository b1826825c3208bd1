//! Client for the external media host that stores profile media.
//!
//! The host is an opaque upload/delete service; its failures are surfaced to
//! clients as `media_service` errors, never remapped to internal ones.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media host unreachable: {0}")]
    Transport(String),
    #[error("media host returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("media host response malformed: {0}")]
    Malformed(String),
}

/// Result of a successful upload: an opaque URL plus the identifier needed to
/// delete the object later.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub url: String,
    pub public_id: String,
    pub duration_seconds: Option<f64>,
    pub format: Option<String>,
}

#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<MediaUpload, MediaError>;
    async fn delete(&self, public_id: &str) -> Result<(), MediaError>;
}

pub struct HttpMediaHost {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct UploadBody {
    url: String,
    public_id: String,
    duration_seconds: Option<f64>,
    format: Option<String>,
}

impl HttpMediaHost {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MediaError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl MediaHost for HttpMediaHost {
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<MediaUpload, MediaError> {
        let url = format!("{}/v1/media", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| MediaError::Transport(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(MediaError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body: UploadBody = res
            .json()
            .await
            .map_err(|e| MediaError::Malformed(e.to_string()))?;
        Ok(MediaUpload {
            url: body.url,
            public_id: body.public_id,
            duration_seconds: body.duration_seconds,
            format: body.format,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        let url = format!("{}/v1/media/{}", self.base_url, public_id);
        let res = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| MediaError::Transport(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(MediaError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
