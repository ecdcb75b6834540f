//! Together AI chat completions

use super::chat::{api_key_for, chat_completion, ChatMessage, ChatRequest};
use super::{GatewayError, ModelProvider, ProviderKind};
use crate::credentials::CredentialStore;
use crate::error::{OptimizerError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

pub struct TogetherProvider {
    client: Client,
    base_url: String,
    timeout: Duration,
    credentials: Arc<dyn CredentialStore>,
}

impl TogetherProvider {
    /// # Arguments
    /// * `base_url` - API root, e.g. "https://api.together.xyz/v1"
    /// * `timeout` - bound on a single completion call
    /// * `credentials` - store the API key is read from on every call
    pub fn new(base_url: &str, timeout: Duration, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OptimizerError::Config(format!("Failed to create HTTP client for Together: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            credentials,
        })
    }
}

#[async_trait]
impl ModelProvider for TogetherProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Together
    }

    async fn invoke(&self, prompt: &str, model: &str) -> std::result::Result<String, GatewayError> {
        let api_key = api_key_for(self.credentials.as_ref(), ProviderKind::Together)?;
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };
        let url = format!("{}/chat/completions", self.base_url);
        chat_completion(&self.client, ProviderKind::Together, &url, &api_key, self.timeout, &request).await
    }
}
