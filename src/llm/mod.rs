//! Model Gateway
//!
//! Uniform interface over the LLM backends. Each backend implements
//! [`ModelProvider`]; the [`ModelGateway`] maps provider identifiers to
//! implementations and never lets a failure escape as anything other than a
//! [`GatewayError`].

mod chat;
pub mod groq;
pub mod ollama;
pub mod together;

use crate::config::OptimizerConfig;
use crate::credentials::CredentialStore;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub use groq::GroqProvider;
pub use ollama::OllamaProvider;
pub use together::TogetherProvider;

/// Marker prefixed to every gateway failure when rendered as text
pub const FAILURE_MARKER: &str = "❌";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local inference server (Ollama)
    Ollama,
    /// Hosted chat-completions API (Together AI)
    Together,
    /// Hosted OpenAI-compatible API (Groq)
    Groq,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Together => "together",
            ProviderKind::Groq => "groq",
        }
    }

    pub fn all() -> [ProviderKind; 3] {
        [ProviderKind::Ollama, ProviderKind::Together, ProviderKind::Groq]
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" | "local" => Ok(ProviderKind::Ollama),
            "together" => Ok(ProviderKind::Together),
            "groq" => Ok(ProviderKind::Groq),
            other => Err(format!(
                "Unknown provider '{}'. Use 'together', 'groq', or 'ollama'.",
                other
            )),
        }
    }
}

/// Provider and model chosen by the caller for one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSelection {
    pub provider: ProviderKind,
    pub model: String,
}

impl ProviderSelection {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GatewayErrorKind {
    /// Service down, connection refused, DNS failure or timeout
    Unreachable,
    /// Provider answered with a non-success HTTP status
    BadStatus(u16),
    /// Response body missing, unparseable, or without content
    Malformed,
    /// No provider registered, or no API key available for it
    Unconfigured,
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayErrorKind::Unreachable => write!(f, "unreachable"),
            GatewayErrorKind::BadStatus(code) => write!(f, "error {}", code),
            GatewayErrorKind::Malformed => write!(f, "malformed response"),
            GatewayErrorKind::Unconfigured => write!(f, "not configured"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("❌ {provider} {kind}: {message}")]
pub struct GatewayError {
    pub provider: ProviderKind,
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(provider: ProviderKind, kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    pub fn unreachable(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::new(provider, GatewayErrorKind::Unreachable, message)
    }

    pub fn bad_status(provider: ProviderKind, status: u16, body: impl Into<String>) -> Self {
        Self::new(provider, GatewayErrorKind::BadStatus(status), body)
    }

    pub fn malformed(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::new(provider, GatewayErrorKind::Malformed, message)
    }

    pub fn unconfigured(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::new(provider, GatewayErrorKind::Unconfigured, message)
    }

    /// Map a transport-level reqwest failure
    pub(crate) fn transport(provider: ProviderKind, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::unreachable(provider, format!("request timed out: {}", err))
        } else if err.is_decode() {
            Self::malformed(provider, format!("could not read response body: {}", err))
        } else {
            Self::unreachable(provider, format!("request failed: {}", err))
        }
    }
}

/// One LLM backend
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Send a single prompt and return the model's text. One attempt, no retry.
    async fn invoke(&self, prompt: &str, model: &str) -> std::result::Result<String, GatewayError>;
}

/// Fill in whatever the caller left unspecified: the provider falls back to
/// `default_provider`, the model to the stored model for that provider and
/// then to `default_model`.
pub fn resolve_selection(
    requested: Option<ProviderSelection>,
    default_provider: ProviderKind,
    default_model: &str,
    credentials: &dyn CredentialStore,
) -> ProviderSelection {
    let provider = requested.as_ref().map(|s| s.provider).unwrap_or(default_provider);
    if let Some(selection) = requested.filter(|s| !s.model.trim().is_empty()) {
        return selection;
    }

    let stored_model = match credentials.get_credentials(provider) {
        Ok(creds) => creds.map(|c| c.model).filter(|m| !m.trim().is_empty()),
        Err(e) => {
            warn!(%provider, "Could not read stored model: {}", e);
            None
        }
    };

    ProviderSelection::new(provider, stored_model.unwrap_or_else(|| default_model.to_string()))
}

/// Registry of providers keyed by identifier
#[derive(Clone, Default)]
pub struct ModelGateway {
    providers: HashMap<ProviderKind, Arc<dyn ModelProvider>>,
}

impl ModelGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway with all three built-in providers wired to `config` and `credentials`
    pub fn from_config(config: &OptimizerConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let gateway = Self::new()
            .with_provider(OllamaProvider::new(
                &config.ollama_url,
                config.probe_timeout,
                config.request_timeout,
            )?)
            .with_provider(TogetherProvider::new(
                &config.together_base_url,
                config.hosted_timeout,
                credentials.clone(),
            )?)
            .with_provider(GroqProvider::new(
                &config.groq_base_url,
                config.hosted_timeout,
                credentials,
            )?);
        Ok(gateway)
    }

    pub fn with_provider<P: ModelProvider + 'static>(mut self, provider: P) -> Self {
        self.register(Arc::new(provider));
        self
    }

    /// Register (or replace) the implementation for a provider identifier
    pub fn register(&mut self, provider: Arc<dyn ModelProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn providers(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    pub async fn invoke(
        &self,
        prompt: &str,
        model: &str,
        provider: ProviderKind,
    ) -> std::result::Result<String, GatewayError> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::malformed(provider, "refusing to send an empty prompt"));
        }

        let backend = self.providers.get(&provider).ok_or_else(|| {
            GatewayError::unconfigured(provider, format!("no '{}' provider registered", provider))
        })?;

        debug!(%provider, model, prompt_chars = prompt.len(), "Invoking model");
        let result = backend.invoke(prompt, model).await;
        if let Err(ref e) = result {
            warn!(%provider, model, kind = %e.kind, "Model call failed: {}", e.message);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ModelProvider for Echo {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Ollama
        }

        async fn invoke(&self, prompt: &str, model: &str) -> std::result::Result<String, GatewayError> {
            Ok(format!("{}:{}", model, prompt))
        }
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("Together".parse::<ProviderKind>().unwrap(), ProviderKind::Together);
        assert_eq!(" groq ".parse::<ProviderKind>().unwrap(), ProviderKind::Groq);
        assert_eq!("local".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert!("openai".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_resolve_selection() {
        use crate::credentials::{InMemoryCredentialStore, ProviderCredentials};

        let store = InMemoryCredentialStore::new()
            .with(ProviderKind::Groq, ProviderCredentials::new("k", "llama-4-8b"));

        let explicit = ProviderSelection::new(ProviderKind::Ollama, "mistral");
        assert_eq!(
            resolve_selection(Some(explicit.clone()), ProviderKind::Together, "default", &store),
            explicit
        );

        let none = resolve_selection(None, ProviderKind::Together, "default", &store);
        assert_eq!(none, ProviderSelection::new(ProviderKind::Together, "default"));

        let stored = resolve_selection(
            Some(ProviderSelection::new(ProviderKind::Groq, "")),
            ProviderKind::Together,
            "default",
            &store,
        );
        assert_eq!(stored, ProviderSelection::new(ProviderKind::Groq, "llama-4-8b"));
    }

    #[test]
    fn test_gateway_error_carries_marker() {
        let err = GatewayError::bad_status(ProviderKind::Groq, 429, "rate limited");
        let text = err.to_string();
        assert!(text.starts_with(FAILURE_MARKER));
        assert!(text.contains("429"));
        assert!(text.contains("rate limited"));
    }

    #[tokio::test]
    async fn test_dispatches_to_registered_provider() {
        let gateway = ModelGateway::new().with_provider(Echo);
        let out = gateway.invoke("hello", "mistral", ProviderKind::Ollama).await.unwrap();
        assert_eq!(out, "mistral:hello");
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_unconfigured() {
        let gateway = ModelGateway::new().with_provider(Echo);
        let err = gateway.invoke("hello", "m", ProviderKind::Groq).await.unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Unconfigured);
        assert_eq!(err.provider, ProviderKind::Groq);
    }

    #[tokio::test]
    async fn test_empty_prompt_is_not_sent() {
        let gateway = ModelGateway::new().with_provider(Echo);
        let err = gateway.invoke("   ", "m", ProviderKind::Ollama).await.unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Malformed);
    }
}
