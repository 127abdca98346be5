//! Video generation client
//!
//! The pipeline only depends on [`VideoGenerator`]; [`GeminiGenerator`] is the
//! HTTP implementation against the generative language API.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::utils::truncate_body;

/// Longest error body kept from a failed generation call
const ERROR_BODY_LIMIT: usize = 1024;

/// Produces a raw generation response for a prompt
///
/// Implementations return the service's JSON untouched; interpreting it is
/// the job of [`crate::resolver::resolve`].
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Run one generation request
    async fn generate(&self, prompt: &str) -> Result<Value>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

/// [`VideoGenerator`] backed by the `generateContent` REST method
pub struct GeminiGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
    api_key: String,
}

impl GeminiGenerator {
    /// Build a generator authenticated with `api_key`
    pub fn new(config: GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Credential("generation API key is empty".into()));
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl VideoGenerator for GeminiGenerator {
    /// Send the prompt once; generation is never retried since each call is billed
    async fn generate(&self, prompt: &str) -> Result<Value> {
        let request = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        tracing::debug!(model = %self.config.model, "sending generation request");

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "generation request rejected");
            return Err(Error::Generation {
                status: status.as_u16(),
                body: truncate_body(&body, ERROR_BODY_LIMIT),
            });
        }

        Ok(response.json().await?)
    }
}
