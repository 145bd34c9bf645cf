//! HTTP client for the Gemini `generateContent` endpoint

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::traits::{
    ApiErrorEnvelope, BackendReply, GenerateContentRequest, GenerateContentResponse,
    ImageBackend, TransportError,
};
use crate::config::GeminiConfig;
use crate::error::{AppError, Result};

/// Gemini image generation backend over HTTP
pub struct GeminiBackend {
    name: String,
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiBackend {
    /// Create a new backend from configuration
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: "gemini".to_string(),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ImageBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_content(
        &self,
        credential: &str,
        request: &GenerateContentRequest,
    ) -> std::result::Result<BackendReply, TransportError> {
        let url = self.endpoint();
        debug!(backend = %self.name, url = %url, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status();
        debug!(backend = %self.name, status = %status, "Received generateContent response");

        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError(format!("Failed to read response body: {}", e)))?;
            return Ok(match serde_json::from_slice::<GenerateContentResponse>(&body) {
                Ok(parsed) => BackendReply::Completed(parsed),
                Err(e) => BackendReply::Malformed(format!("Failed to parse response: {}", e)),
            });
        }

        let body = response.text().await.unwrap_or_default();
        let error = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.error);
        warn!(
            backend = %self.name,
            status = status.as_u16(),
            has_error_body = error.is_some(),
            "Upstream rejected generateContent request"
        );

        Ok(BackendReply::Rejected {
            status: status.as_u16(),
            error,
        })
    }
}
