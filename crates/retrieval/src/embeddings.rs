//! Remote embedding client
//!
//! Talks to the embedding collaborator over HTTP. Embeddings are a pure
//! function of input, so transient failures are retried idempotently with
//! doubling backoff before surfacing.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use taxlens_config::constants::{endpoints, timeouts};
use taxlens_core::EmbeddingService;

use crate::RetrievalError;

/// Embedding client configuration
#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    /// Embedding API endpoint
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Bounded retries for transient failures
    pub max_retries: u32,
    /// Initial backoff, doubles per attempt
    pub initial_backoff: Duration,
}

impl Default for EmbeddingClientConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::EMBEDDINGS_DEFAULT.to_string(),
            model: "nomic-embed-text".to_string(),
            timeout: Duration::from_secs(timeouts::EMBEDDING_SECS),
            max_retries: timeouts::MAX_RETRIES,
            initial_backoff: Duration::from_millis(timeouts::INITIAL_BACKOFF_MS),
        }
    }
}

impl From<&taxlens_config::RetrievalSettings> for EmbeddingClientConfig {
    fn from(settings: &taxlens_config::RetrievalSettings) -> Self {
        Self {
            endpoint: settings.embeddings_endpoint.clone(),
            model: settings.embedding_model.clone(),
            timeout: Duration::from_secs(settings.embedding_timeout_secs),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP embedding client
pub struct HttpEmbeddingClient {
    client: Client,
    config: EmbeddingClientConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: EmbeddingClientConfig) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RetrievalError::Embedding(format!("client build failed: {e}")))?;

        Ok(Self { client, config })
    }

    /// Embed a single text, retrying transient failures
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut backoff = self.config.initial_backoff;
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.embed_once(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "embedding attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RetrievalError::Embedding("no attempts made".to_string())))
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let request = EmbedRequest {
            model: self.config.model.clone(),
            input: text.to_string(),
        };

        let url = format!("{}/api/embed", self.config.endpoint);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RetrievalError::Embedding(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Embedding(format!(
                "embedding service returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Embedding(format!("bad response body: {e}")))?;

        parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding("no embedding returned".to_string()))
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> taxlens_core::Result<Vec<f32>> {
        Ok(self.embed_text(text).await?)
    }
}
