//! Local inference through an Ollama server
//!
//! Every call first probes the server root; a server that does not answer
//! within the probe timeout is reported as unreachable without attempting
//! generation.

use super::{GatewayError, ModelProvider, ProviderKind};
use crate::error::{OptimizerError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    probe_timeout: Duration,
    request_timeout: Duration,
}

impl OllamaProvider {
    /// # Arguments
    /// * `base_url` - server root, e.g. "http://localhost:11434"
    /// * `probe_timeout` - bound on the liveness GET
    /// * `request_timeout` - bound on the generation POST
    pub fn new(base_url: &str, probe_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(probe_timeout)
            .build()
            .map_err(|e| OptimizerError::Config(format!("Failed to create HTTP client for Ollama: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            probe_timeout,
            request_timeout,
        })
    }

    /// GET the server root; only HTTP 200 counts as up
    pub async fn is_up(&self) -> bool {
        match self
            .client
            .get(&self.base_url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().as_u16() == 200,
            Err(e) => {
                debug!("Ollama probe failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn invoke(&self, prompt: &str, model: &str) -> std::result::Result<String, GatewayError> {
        if !self.is_up().await {
            return Err(GatewayError::unreachable(
                ProviderKind::Ollama,
                format!(
                    "Ollama is not running at {}. Please start it with: `ollama run {}`",
                    self.base_url, model
                ),
            ));
        }

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.request_timeout)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| GatewayError::transport(ProviderKind::Ollama, e))?;

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::bad_status(ProviderKind::Ollama, status.as_u16(), body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::transport(ProviderKind::Ollama, e))?;
        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            GatewayError::malformed(ProviderKind::Ollama, format!("failed to parse response: {}", e))
        })?;

        let text = parsed.response.trim();
        if text.is_empty() {
            return Err(GatewayError::malformed(ProviderKind::Ollama, "No output from the model."));
        }
        Ok(text.to_string())
    }
}
