//! Groq (OpenAI-compatible) chat completions

use super::chat::{api_key_for, chat_completion, ChatMessage, ChatRequest};
use super::{GatewayError, ModelProvider, ProviderKind};
use crate::credentials::CredentialStore;
use crate::error::{OptimizerError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub struct GroqProvider {
    client: Client,
    base_url: String,
    timeout: Duration,
    credentials: Arc<dyn CredentialStore>,
}

impl GroqProvider {
    pub fn new(base_url: &str, timeout: Duration, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OptimizerError::Config(format!("Failed to create HTTP client for Groq: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            credentials,
        })
    }
}

#[async_trait]
impl ModelProvider for GroqProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }

    async fn invoke(&self, prompt: &str, model: &str) -> std::result::Result<String, GatewayError> {
        let api_key = api_key_for(self.credentials.as_ref(), ProviderKind::Groq)?;
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
        };
        let url = format!("{}/chat/completions", self.base_url);
        chat_completion(&self.client, ProviderKind::Groq, &url, &api_key, self.timeout, &request).await
    }
}
