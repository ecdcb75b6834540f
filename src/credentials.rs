//! Credentials store
//!
//! The optimizer only ever reads API keys and models through [`CredentialStore`].
//! [`JsonCredentialStore`] also backs the configuration commands, which write
//! provider keys and warehouse connection profiles to the same file.

use crate::error::{OptimizerError, Result};
use crate::llm::ProviderKind;
use crate::warehouse::ConnectionProfile;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Key under which named warehouse connections are stored
const CONNECTIONS_KEY: &str = "snowflake";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
}

impl ProviderCredentials {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

pub trait CredentialStore: Send + Sync {
    /// Credentials for `provider`, or `None` when nothing is stored for it
    fn get_credentials(&self, provider: ProviderKind) -> Result<Option<ProviderCredentials>>;
}

/// File-backed store using the dashboard's `connections.json` layout
#[derive(Debug, Clone)]
pub struct JsonCredentialStore {
    path: PathBuf,
}

impl JsonCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            debug!("Credentials file {} not found, treating as empty", self.path.display());
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(OptimizerError::Credentials(format!(
                "{} must contain a JSON object",
                self.path.display()
            ))),
        }
    }

    fn save_all(&self, config: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    pub fn update_api_credentials(&self, provider: ProviderKind, api_key: &str, model: &str) -> Result<()> {
        let mut config = self.load_all()?;
        config.insert(
            provider.as_str().to_string(),
            serde_json::to_value(ProviderCredentials::new(api_key, model))?,
        );
        self.save_all(&config)?;
        info!("Stored credentials for {} in {}", provider, self.path.display());
        Ok(())
    }

    pub fn connections(&self) -> Result<BTreeMap<String, ConnectionProfile>> {
        let config = self.load_all()?;
        match config.get(CONNECTIONS_KEY) {
            None | Some(Value::Null) => Ok(BTreeMap::new()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                OptimizerError::Credentials(format!("invalid '{}' section: {}", CONNECTIONS_KEY, e))
            }),
        }
    }

    pub fn connection(&self, name: &str) -> Result<Option<ConnectionProfile>> {
        Ok(self.connections()?.remove(name))
    }

    pub fn upsert_connection(&self, name: &str, profile: &ConnectionProfile) -> Result<()> {
        let mut config = self.load_all()?;
        let section = config
            .entry(CONNECTIONS_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match section {
            Value::Object(entries) => {
                entries.insert(name.to_string(), serde_json::to_value(profile)?);
            }
            _ => {
                return Err(OptimizerError::Credentials(format!(
                    "'{}' section is not an object",
                    CONNECTIONS_KEY
                )))
            }
        }
        self.save_all(&config)
    }
}

impl CredentialStore for JsonCredentialStore {
    fn get_credentials(&self, provider: ProviderKind) -> Result<Option<ProviderCredentials>> {
        let config = self.load_all()?;
        match config.get(provider.as_str()) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                OptimizerError::Credentials(format!("invalid entry for '{}': {}", provider, e))
            }),
        }
    }
}

/// `TOGETHER_API_KEY` / `TOGETHER_MODEL`, `GROQ_API_KEY` / `GROQ_MODEL`
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialStore {
    vars: HashMap<String, String>,
}

impl EnvCredentialStore {
    /// Snapshot the current process environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl CredentialStore for EnvCredentialStore {
    fn get_credentials(&self, provider: ProviderKind) -> Result<Option<ProviderCredentials>> {
        let prefix = match provider {
            ProviderKind::Ollama => return Ok(None),
            ProviderKind::Together => "TOGETHER",
            ProviderKind::Groq => "GROQ",
        };
        let api_key = self.vars.get(&format!("{}_API_KEY", prefix)).cloned();
        let model = self.vars.get(&format!("{}_MODEL", prefix)).cloned();
        Ok(match (api_key, model) {
            (None, None) => None,
            (api_key, model) => Some(ProviderCredentials {
                api_key: api_key.unwrap_or_default(),
                model: model.unwrap_or_default(),
            }),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    entries: HashMap<ProviderKind, ProviderCredentials>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: ProviderKind, credentials: ProviderCredentials) -> Self {
        self.entries.insert(provider, credentials);
        self
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get_credentials(&self, provider: ProviderKind) -> Result<Option<ProviderCredentials>> {
        Ok(self.entries.get(&provider).cloned())
    }
}

/// Asks each store in order; the first one holding a non-empty API key wins.
/// A store that only knows a model still contributes it when no key turns up.
#[derive(Clone, Default)]
pub struct ChainedCredentialStore {
    stores: Vec<Arc<dyn CredentialStore>>,
}

impl ChainedCredentialStore {
    pub fn new(stores: Vec<Arc<dyn CredentialStore>>) -> Self {
        Self { stores }
    }
}

impl CredentialStore for ChainedCredentialStore {
    fn get_credentials(&self, provider: ProviderKind) -> Result<Option<ProviderCredentials>> {
        let mut fallback = None;
        for store in &self.stores {
            if let Some(creds) = store.get_credentials(provider)? {
                if !creds.api_key.trim().is_empty() {
                    return Ok(Some(creds));
                }
                fallback.get_or_insert(creds);
            }
        }
        Ok(fallback)
    }
}
