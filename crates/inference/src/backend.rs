//! HTTP inference backend

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use taxlens_config::constants::{endpoints, timeouts};
use taxlens_core::{DeterminationRequest, DeterminationResponse, InferenceService};

use crate::InferenceError;

/// Inference backend configuration
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Service endpoint
    pub endpoint: String,
    /// Model name/ID
    pub model: String,
    /// API key (optional)
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum attempts beyond the first. Inference calls are not
    /// idempotent; this must stay at or below 2.
    pub max_retries: u32,
    /// Initial backoff, doubles per retry
    pub initial_backoff: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::INFERENCE_DEFAULT.to_string(),
            model: "tax-determination-v2".to_string(),
            api_key: None,
            timeout: Duration::from_secs(timeouts::INFERENCE_SECS),
            max_retries: timeouts::MAX_RETRIES,
            initial_backoff: Duration::from_millis(timeouts::INITIAL_BACKOFF_MS),
        }
    }
}

impl From<&taxlens_config::InferenceSettings> for InferenceConfig {
    fn from(settings: &taxlens_config::InferenceSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries.min(2),
            ..Default::default()
        }
    }
}

impl InferenceConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct DetermineApiRequest<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a DeterminationRequest,
}

#[derive(Debug, Deserialize)]
struct DetermineApiResponse {
    #[serde(flatten)]
    response: DeterminationResponse,
}

/// HTTP client for the determination service
pub struct HttpInferenceBackend {
    client: Client,
    config: InferenceConfig,
}

impl HttpInferenceBackend {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InferenceError::Request(format!("client build failed: {e}")))?;

        Ok(Self { client, config })
    }

    /// One determination call with bounded retry
    pub async fn determine_with_retry(
        &self,
        request: &DeterminationRequest,
    ) -> Result<DeterminationResponse, InferenceError> {
        let mut backoff = self.config.initial_backoff;
        let mut last_err: Option<InferenceError> = None;

        // max_retries is capped at 2: non-idempotent calls
        for attempt in 0..=self.config.max_retries.min(2) {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.determine_once(request).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(attempt, "inference succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "inference attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(InferenceError::Unavailable(
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        ))
    }

    async fn determine_once(
        &self,
        request: &DeterminationRequest,
    ) -> Result<DeterminationResponse, InferenceError> {
        let url = format!("{}/v1/determine", self.config.endpoint);
        let body = DetermineApiRequest {
            model: &self.config.model,
            request,
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(self.config.timeout.as_secs())
            } else {
                InferenceError::Request(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::BadResponse(format!(
                "service returned {status}: {body}"
            )));
        }

        let parsed: DetermineApiResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::BadResponse(e.to_string()))?;

        let mut result = parsed.response;
        // Confidence is a 0-100 scale regardless of what the service sends
        result.base_confidence = result.base_confidence.min(100);
        Ok(result)
    }
}

#[async_trait]
impl InferenceService for HttpInferenceBackend {
    async fn determine(
        &self,
        request: &DeterminationRequest,
    ) -> taxlens_core::Result<DeterminationResponse> {
        Ok(self.determine_with_retry(request).await?)
    }
}
