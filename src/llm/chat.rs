//! Shared OpenAI-style chat-completions call used by the hosted providers.

use super::{GatewayError, ProviderKind};
use crate::credentials::CredentialStore;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub(crate) async fn chat_completion(
    client: &Client,
    provider: ProviderKind,
    url: &str,
    api_key: &str,
    timeout: Duration,
    request: &ChatRequest<'_>,
) -> Result<String, GatewayError> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .timeout(timeout)
        .json(request)
        .send()
        .await
        .map_err(|e| GatewayError::transport(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        return Err(GatewayError::bad_status(provider, status.as_u16(), body));
    }

    let body = response
        .text()
        .await
        .map_err(|e| GatewayError::transport(provider, e))?;
    extract_content(provider, &body)
}

/// Resolve the API key for a hosted provider at call time
pub(crate) fn api_key_for(
    credentials: &dyn CredentialStore,
    provider: ProviderKind,
) -> Result<String, GatewayError> {
    let creds = credentials
        .get_credentials(provider)
        .map_err(|e| GatewayError::unconfigured(provider, e.to_string()))?;

    match creds {
        Some(c) if !c.api_key.trim().is_empty() => Ok(c.api_key),
        _ => Err(GatewayError::unconfigured(
            provider,
            format!("no API key configured for '{}'", provider),
        )),
    }
}

/// Pull `choices[0].message.content` out of a chat-completions body
pub(crate) fn extract_content(provider: ProviderKind, body: &str) -> Result<String, GatewayError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::malformed(provider, format!("failed to parse response: {}", e)))?;

    if let Some(error) = parsed.error {
        return Err(GatewayError::malformed(provider, format!("API error: {}", error)));
    }

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::malformed(provider, "no choices in response"))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(GatewayError::malformed(provider, "response was filtered by content policy"));
    }

    let content = choice
        .message
        .and_then(|m| m.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    if content.is_empty() {
        return Err(GatewayError::malformed(provider, "no content in response"));
    }

    Ok(content)
}
