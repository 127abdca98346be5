//! Generators, configuration, and payloads for end-to-end runs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use veo_drive::config::{FetchConfig, RetryConfig, UploadConfig};
use veo_drive::{Config, Result, StaticCredentials, VideoGenerator};
use wiremock::MockServer;

/// Generator that answers every prompt with a single file part
pub struct FileGenerator {
    uri: String,
    mime_type: Option<String>,
}

impl FileGenerator {
    pub fn new(uri: impl Into<String>, mime_type: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            uri: uri.into(),
            mime_type: mime_type.map(str::to_string),
        })
    }
}

#[async_trait]
impl VideoGenerator for FileGenerator {
    async fn generate(&self, _prompt: &str) -> Result<Value> {
        let mut file_data = json!({ "fileUri": self.uri });
        if let Some(mime_type) = &self.mime_type {
            file_data["mimeType"] = json!(mime_type);
        }
        Ok(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "fileData": file_data }] },
                "finishReason": "STOP"
            }]
        }))
    }
}

/// Configuration pointing every endpoint at `server`
pub fn config_for(server: &MockServer) -> Config {
    Config {
        fetch: FetchConfig {
            storage_endpoint: server.uri(),
            allow_http: true,
            ..Default::default()
        },
        upload: UploadConfig {
            endpoint: server.uri(),
            ..Default::default()
        },
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Default::default()
    }
}

pub fn credentials() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new(
        Some("drive-token".into()),
        Some("gcs-token".into()),
    ))
}

/// Deterministic payload of `len` bytes
pub fn video_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
