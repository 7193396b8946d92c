//! Model registry
//!
//! Static catalog of model descriptors, built once at startup either from the
//! built-in catalog or from a JSON file, and read-only afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::credentials::CredentialProvider;
use super::settings::Settings;

/// Wire protocol family of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// OpenAI chat-completions protocol (OpenAI, DashScope, Baichuan, ...)
    #[serde(alias = "openai")]
    OpenaiCompatible,
    /// Azure OpenAI deployments
    Azure,
    /// Hugging Face inference router
    Huggingface,
    /// Local Ollama server
    Ollama,
    /// Anthropic messages API
    Anthropic,
}

impl ProviderKind {
    /// Whether calls need a credential to be dispatched
    pub fn requires_credential(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenaiCompatible => "openai-compatible",
            ProviderKind::Azure => "azure",
            ProviderKind::Huggingface => "huggingface",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable registry entry describing how to reach one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    /// Stable identifier used by callers
    pub key: String,
    /// Name shown to users
    pub display_name: String,
    /// Provider family
    pub provider_kind: ProviderKind,
    /// Model identifier passed to the provider
    pub underlying_model_id: String,
    /// Name of the credential this model needs
    pub credential_env_key: String,
    /// Endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Forces a wire protocol independent of `provider_kind`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_override: Option<ProviderKind>,
    /// Temperature that always wins over the caller's value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_temperature: Option<f32>,
    /// Per-model request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Whether the model is offered at all
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Temperature pinned for low-variance providers
pub const LOW_VARIANCE_TEMPERATURE: f32 = 0.1;

/// Underlying model id fragments that get the low-variance temperature
const LOW_VARIANCE_MODEL_FRAGMENTS: &[&str] = &["qwen", "azure"];

impl ModelDescriptor {
    /// Create an enabled descriptor with no overrides
    pub fn new(
        key: &str,
        display_name: &str,
        provider_kind: ProviderKind,
        underlying_model_id: &str,
        credential_env_key: &str,
    ) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            provider_kind,
            underlying_model_id: underlying_model_id.to_string(),
            credential_env_key: credential_env_key.to_string(),
            base_url: None,
            provider_override: None,
            forced_temperature: None,
            timeout_secs: None,
            enabled: true,
        }
    }

    /// Set the endpoint override
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Force a wire protocol
    pub fn with_provider_override(mut self, kind: ProviderKind) -> Self {
        self.provider_override = Some(kind);
        self
    }

    /// Pin the sampling temperature
    pub fn with_forced_temperature(mut self, temperature: f32) -> Self {
        self.forced_temperature = Some(temperature);
        self
    }

    /// Set the per-model timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Mark the descriptor disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Fill in the low-variance temperature for Azure and Qwen models
    ///
    /// An explicit `forced_temperature` is kept as is.
    fn with_policy_defaults(mut self) -> Self {
        if self.forced_temperature.is_none() {
            let model_id = self.underlying_model_id.to_lowercase();
            let low_variance = self.provider_kind == ProviderKind::Azure
                || self.provider_override == Some(ProviderKind::Azure)
                || LOW_VARIANCE_MODEL_FRAGMENTS.iter().any(|fragment| model_id.contains(fragment));
            if low_variance {
                self.forced_temperature = Some(LOW_VARIANCE_TEMPERATURE);
            }
        }
        self
    }

    /// Protocol actually spoken on the wire
    pub fn wire_protocol(&self) -> ProviderKind {
        self.provider_override.unwrap_or(self.provider_kind)
    }

    /// Whether the descriptor should be offered given the current credentials
    pub fn is_available(&self, credentials: &dyn CredentialProvider) -> bool {
        self.enabled
            && (!self.provider_kind.requires_credential() || credentials.has(&self.credential_env_key))
    }
}

/// Per-user registry file in the platform config directory
fn user_registry_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("llmgate").join("models.json"))
}

/// Registry file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFile {
    models: Vec<ModelDescriptor>,
}

/// Read-only model catalog, ordered as configured
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    /// Build a registry, rejecting duplicate or malformed entries
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self> {
        let registry = Self::from_models(models);
        registry.validate()?;
        Ok(registry)
    }

    /// Built-in catalog
    pub fn builtin(settings: &Settings) -> Self {
        let endpoints = &settings.providers;
        let models = vec![
            ModelDescriptor::new("gpt-4o", "OpenAI GPT-4o", ProviderKind::OpenaiCompatible, "gpt-4o", "OPENAI_API_KEY")
                .disabled(),
            ModelDescriptor::new(
                "claude-3-sonnet",
                "Anthropic Claude 3 Sonnet",
                ProviderKind::Anthropic,
                "claude-3-sonnet-20240229",
                "ANTHROPIC_API_KEY",
            )
            .disabled(),
            ModelDescriptor::new("azure-gpt-4o", "Azure OpenAI GPT-4o", ProviderKind::Azure, "gpt-4o", "AZURE_API_KEY")
                .with_base_url(endpoints.azure_api_base.clone()),
            ModelDescriptor::new(
                "qwen2.5-72b-instruct",
                "Aliyun DashScope qwen2.5-72b-instruct",
                ProviderKind::OpenaiCompatible,
                "qwen2.5-72b-instruct",
                "DASHSCOPE_API_KEY",
            )
            .with_base_url(Some("https://dashscope.aliyuncs.com/compatible-mode/v1".to_string())),
            ModelDescriptor::new(
                "baichuan4",
                "Baichuan AI Baichuan4-turbo",
                ProviderKind::OpenaiCompatible,
                "Baichuan4-turbo",
                "BAICHUAN_API_KEY",
            )
            .with_base_url(endpoints.baichuan_base_url.clone()),
            ModelDescriptor::new(
                "DeepSeek-R1",
                "Hugging Face DeepSeek-R1",
                ProviderKind::Huggingface,
                "deepseek-ai/DeepSeek-R1:together",
                "HF_TOKEN",
            )
            .with_provider_override(ProviderKind::Huggingface),
            ModelDescriptor::new("qwq", "Ollama QwQ", ProviderKind::Ollama, "qwq", "OLLAMA_API_KEY")
                .with_base_url(Some(endpoints.ollama_base_url.clone())),
        ];

        Self::from_models(models)
    }

    fn from_models(models: Vec<ModelDescriptor>) -> Self {
        Self {
            models: models.into_iter().map(ModelDescriptor::with_policy_defaults).collect(),
        }
    }

    /// Load a registry from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading model registry from: {:?}", path);

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model registry file: {:?}", path))?;

        let file: RegistryFile = serde_json::from_str(&content)
            .with_context(|| "Failed to parse model registry JSON")?;

        let registry = Self::new(file.models)?;
        debug!("Loaded {} model descriptors", registry.models.len());
        Ok(registry)
    }

    /// Load the registry from the configured locations
    ///
    /// Searches in order:
    /// 1. `MODELS_FILE`
    /// 2. <platform config dir>/llmgate/models.json
    /// 3. ./models.json
    ///
    /// Falls back to the built-in catalog when none exists.
    pub fn load_default(settings: &Settings) -> Result<Self> {
        if let Some(path) = &settings.models_file {
            return Self::load(path);
        }

        if let Some(config_path) = user_registry_path() {
            if config_path.exists() {
                return Self::load(&config_path);
            }
        }

        let local_path = Path::new("models.json");
        if local_path.exists() {
            return Self::load(local_path);
        }

        info!("No model registry file found, using built-in catalog");
        Ok(Self::builtin(settings))
    }

    /// Validate registry contents
    fn validate(&self) -> Result<()> {
        let mut keys = HashSet::new();

        for model in &self.models {
            if model.key.trim().is_empty() {
                anyhow::bail!("Model key cannot be empty");
            }
            if !keys.insert(model.key.as_str()) {
                anyhow::bail!("Duplicate model key '{}'", model.key);
            }
            if model.underlying_model_id.trim().is_empty() {
                anyhow::bail!("Model '{}' must have an underlying model id", model.key);
            }
            if model.credential_env_key.trim().is_empty() {
                anyhow::bail!("Model '{}' must name a credential key", model.key);
            }
            if let Some(base_url) = &model.base_url {
                if !base_url.starts_with("http") {
                    anyhow::bail!("Invalid base URL for model '{}': {}", model.key, base_url);
                }
            }
            if let Some(temperature) = model.forced_temperature {
                if !(0.0..=2.0).contains(&temperature) {
                    anyhow::bail!("Forced temperature for model '{}' must be between 0.0 and 2.0", model.key);
                }
            }
            if model.timeout_secs == Some(0) {
                anyhow::bail!("Timeout for model '{}' cannot be 0", model.key);
            }
        }

        Ok(())
    }

    /// Find a descriptor by key
    pub fn lookup(&self, key: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|model| model.key == key)
    }

    /// Enabled descriptors whose credentials are currently present, in registry order
    pub fn list_enabled(&self, credentials: &dyn CredentialProvider) -> Vec<&ModelDescriptor> {
        self.models
            .iter()
            .filter(|model| model.is_available(credentials))
            .collect()
    }

    /// Every descriptor, in registry order
    pub fn all(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::credentials::StaticCredentials;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn test_settings() -> Settings {
        Settings::from_lookup(|_| None).unwrap()
    }

    #[test]
    fn test_builtin_catalog_order() {
        let registry = ModelRegistry::builtin(&test_settings());
        let keys: Vec<&str> = registry.all().iter().map(|m| m.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["gpt-4o", "claude-3-sonnet", "azure-gpt-4o", "qwen2.5-72b-instruct", "baichuan4", "DeepSeek-R1", "qwq"]
        );
    }

    #[test]
    fn test_builtin_low_variance_models() {
        let registry = ModelRegistry::builtin(&test_settings());
        for model in registry.all() {
            let low_variance = model.provider_kind == ProviderKind::Azure
                || model.underlying_model_id.contains("qwen");
            let expected = if low_variance { Some(0.1) } else { None };
            assert_eq!(model.forced_temperature, expected, "model {}", model.key);
        }
    }

    #[test]
    fn test_ollama_needs_no_credential() {
        let registry = ModelRegistry::builtin(&test_settings());
        let creds = StaticCredentials::new();
        let enabled: Vec<&str> = registry.list_enabled(&creds).iter().map(|m| m.key.as_str()).collect();
        assert_eq!(enabled, vec!["qwq"]);
    }

    #[test]
    fn test_load_from_file() {
        let json = r#"{
            "models": [
                {
                    "key": "deepseek-chat",
                    "displayName": "DeepSeek Chat",
                    "providerKind": "openai",
                    "underlyingModelId": "deepseek-chat",
                    "credentialEnvKey": "DEEPSEEK_API_KEY",
                    "baseUrl": "https://api.deepseek.com/v1",
                    "timeoutSecs": 90
                },
                {
                    "key": "llama3",
                    "displayName": "Ollama Llama 3",
                    "providerKind": "ollama",
                    "underlyingModelId": "llama3",
                    "credentialEnvKey": "OLLAMA_API_KEY",
                    "enabled": false
                }
            ]
        }"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let registry = ModelRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 2);

        let deepseek = registry.lookup("deepseek-chat").unwrap();
        assert_eq!(deepseek.provider_kind, ProviderKind::OpenaiCompatible);
        assert_eq!(deepseek.timeout_secs, Some(90));
        assert!(deepseek.enabled);
        assert!(!registry.lookup("llama3").unwrap().enabled);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let model = ModelDescriptor::new("a", "A", ProviderKind::Ollama, "a", "K");
        assert!(ModelRegistry::new(vec![model.clone(), model]).is_err());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let model = ModelDescriptor::new("a", "A", ProviderKind::OpenaiCompatible, "a", "K")
            .with_base_url(Some("ftp://example.com".to_string()));
        assert!(ModelRegistry::new(vec![model]).is_err());
    }

    #[test]
    fn test_user_registry_path_is_platform_config_dir() {
        if let Some(config_dir) = dirs::config_dir() {
            let path = user_registry_path().unwrap();
            assert!(path.starts_with(&config_dir));
            assert!(path.ends_with("llmgate/models.json"));
        }
    }
}
