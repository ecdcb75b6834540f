//! Optimizer configuration
//!
//! Endpoints, timeouts and defaults, read from the environment (after `.env`).

use crate::error::{OptimizerError, Result};
use crate::llm::ProviderKind;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";
pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
pub const DEFAULT_CREDENTIALS_FILE: &str = "shared/connections.json";

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub ollama_url: String,
    pub together_base_url: String,
    pub groq_base_url: String,

    /// Bound on the local inference liveness probe
    pub probe_timeout: Duration,
    /// Bound on a local inference generation call
    pub request_timeout: Duration,
    /// Bound on a hosted provider call
    pub hosted_timeout: Duration,
    /// Bound on one scoped warehouse session (connect, statement, close)
    pub warehouse_timeout: Duration,

    pub default_provider: ProviderKind,
    pub default_model: String,
    pub credentials_file: PathBuf,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            together_base_url: DEFAULT_TOGETHER_BASE_URL.to_string(),
            groq_base_url: DEFAULT_GROQ_BASE_URL.to_string(),
            probe_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            hosted_timeout: Duration::from_secs(60),
            warehouse_timeout: Duration::from_secs(60),
            default_provider: ProviderKind::Together,
            default_model: DEFAULT_MODEL.to_string(),
            credentials_file: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
        }
    }
}

impl OptimizerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let default_provider = match lookup("QUERYVERSE_DEFAULT_PROVIDER") {
            Some(value) => ProviderKind::from_str(&value)
                .map_err(|e| OptimizerError::Config(format!("QUERYVERSE_DEFAULT_PROVIDER: {}", e)))?,
            None => defaults.default_provider,
        };

        Ok(Self {
            ollama_url: lookup("OLLAMA_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.ollama_url),
            together_base_url: lookup("TOGETHER_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.together_base_url),
            groq_base_url: lookup("GROQ_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.groq_base_url),
            probe_timeout: seconds(&lookup, "OLLAMA_PROBE_TIMEOUT_SECS", defaults.probe_timeout)?,
            request_timeout: seconds(&lookup, "OLLAMA_TIMEOUT_SECS", defaults.request_timeout)?,
            hosted_timeout: seconds(&lookup, "LLM_TIMEOUT_SECS", defaults.hosted_timeout)?,
            warehouse_timeout: seconds(&lookup, "WAREHOUSE_TIMEOUT_SECS", defaults.warehouse_timeout)?,
            default_provider,
            default_model: lookup("QUERYVERSE_DEFAULT_MODEL").unwrap_or(defaults.default_model),
            credentials_file: lookup("QUERYVERSE_CREDENTIALS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.credentials_file),
        })
    }
}

fn seconds<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                OptimizerError::Config(format!("{} must be a whole number of seconds, got '{}'", key, raw))
            })?;
            if secs == 0 {
                return Err(OptimizerError::Config(format!("{} must be greater than zero", key)));
            }
            Ok(Duration::from_secs(secs))
        }
    }
}
