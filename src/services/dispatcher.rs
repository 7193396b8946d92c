//! Provider dispatcher
//!
//! Resolves a model key against the registry and live credentials, shapes the
//! provider call and invokes the provider for the model's wire protocol.

use super::model_policy::{choose_default_model, choose_lightweight_model};
use super::streaming::{StreamEvent, StreamLabel, StreamingAdapter};
use super::telemetry::{CallOutcome, Telemetry};
use crate::config::settings::CompletionConfig;
use crate::config::{CredentialProvider, ModelDescriptor, ModelRegistry, ProviderKind, Settings};
use crate::models::chat::{Completion, CompletionRequest};
use crate::providers::{provider_for, Provider, ProviderCall};
use crate::utils::error::{AppError, AppResult};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

/// Every protocol a descriptor can select
const ALL_PROTOCOLS: [ProviderKind; 5] = [
    ProviderKind::OpenaiCompatible,
    ProviderKind::Azure,
    ProviderKind::Huggingface,
    ProviderKind::Ollama,
    ProviderKind::Anthropic,
];

/// Descriptor plus the credential resolved for this call
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    /// Registry entry
    pub descriptor: ModelDescriptor,
    /// Credential value; absent only for keyless providers
    pub api_key: Option<String>,
}

/// Dispatcher timeouts and defaults taken from settings
#[derive(Debug, Clone)]
struct CallDefaults {
    completion: CompletionConfig,
    api_version: String,
    timeout: Duration,
    stream_timeout: Duration,
}

/// Routes completion requests to providers
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    credentials: Arc<dyn CredentialProvider>,
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
    defaults: CallDefaults,
    telemetry: Telemetry,
    streaming: StreamingAdapter,
}

impl Dispatcher {
    /// Create a dispatcher with one HTTP provider per wire protocol
    pub fn new(
        registry: Arc<ModelRegistry>,
        credentials: Arc<dyn CredentialProvider>,
        settings: &Settings,
        telemetry: Telemetry,
    ) -> Result<Self> {
        let mut providers = HashMap::new();
        for kind in ALL_PROTOCOLS {
            providers.insert(kind, provider_for(kind)?);
        }
        Ok(Self::with_providers(registry, credentials, settings, telemetry, providers))
    }

    /// Create a dispatcher with explicit providers
    pub fn with_providers(
        registry: Arc<ModelRegistry>,
        credentials: Arc<dyn CredentialProvider>,
        settings: &Settings,
        telemetry: Telemetry,
        providers: HashMap<ProviderKind, Arc<dyn Provider>>,
    ) -> Self {
        let defaults = CallDefaults {
            completion: settings.completion.clone(),
            api_version: settings.providers.azure_api_version.clone(),
            timeout: settings.provider_timeout(),
            stream_timeout: settings.provider_stream_timeout(),
        };

        Self {
            registry,
            credentials,
            providers,
            defaults,
            streaming: StreamingAdapter::new(telemetry.clone()),
            telemetry,
        }
    }

    /// Replace the provider for one wire protocol
    pub fn with_provider(mut self, kind: ProviderKind, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    /// Registry the dispatcher resolves against
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Models that can be dispatched right now, in registry order
    pub fn available_models(&self) -> Vec<&ModelDescriptor> {
        self.registry.list_enabled(self.credentials.as_ref())
    }

    /// Model used when a request names none
    pub fn default_model_key(&self) -> AppResult<String> {
        choose_default_model(&self.available_models())
    }

    /// Model used for auxiliary calls such as keyword extraction
    pub fn lightweight_model_key(&self) -> AppResult<String> {
        choose_lightweight_model(&self.available_models())
    }

    /// Look up `model_key` and its credential
    ///
    /// Credentials are read on every call so rotation takes effect without restart.
    pub fn resolve(&self, model_key: &str) -> AppResult<ResolvedModel> {
        let descriptor = self
            .registry
            .lookup(model_key)
            .filter(|descriptor| descriptor.enabled)
            .ok_or_else(|| AppError::UnknownModel(model_key.to_string()))?;

        let api_key = self.credentials.get(&descriptor.credential_env_key);
        if api_key.is_none() && descriptor.provider_kind.requires_credential() {
            return Err(AppError::MissingCredential {
                model: descriptor.display_name.clone(),
                env_key: descriptor.credential_env_key.clone(),
            });
        }

        Ok(ResolvedModel {
            descriptor: descriptor.clone(),
            api_key,
        })
    }

    /// Shape provider parameters; a forced temperature is applied last
    pub fn build_call(&self, resolved: &ResolvedModel, request: &CompletionRequest) -> ProviderCall {
        let descriptor = &resolved.descriptor;

        let mut temperature = request.temperature.unwrap_or(self.defaults.completion.temperature);
        if let Some(forced) = descriptor.forced_temperature {
            if request.temperature.is_some_and(|requested| requested != forced) {
                debug!("Overriding temperature {:?} with {} for {}", request.temperature, forced, descriptor.key);
            }
            temperature = forced;
        }

        let timeout = descriptor
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(if request.stream { self.defaults.stream_timeout } else { self.defaults.timeout });

        ProviderCall {
            model: descriptor.underlying_model_id.clone(),
            messages: request.messages.clone(),
            max_tokens: request.max_tokens.unwrap_or(self.defaults.completion.max_tokens),
            temperature,
            base_url: descriptor.base_url.clone(),
            api_key: resolved.api_key.clone(),
            api_version: self.defaults.api_version.clone(),
            timeout,
        }
    }

    /// Validate, resolve and shape a request, and pick its provider
    fn prepare(&self, request: &CompletionRequest) -> AppResult<(ResolvedModel, ProviderCall, Arc<dyn Provider>)> {
        if request.messages.is_empty() {
            return Err(AppError::Validation("At least one message is required".to_string()));
        }

        let resolved = self.resolve(&request.model_key)?;
        let call = self.build_call(&resolved, request);

        let protocol = resolved.descriptor.wire_protocol();
        let provider = self
            .providers
            .get(&protocol)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("No provider registered for {}", protocol)))?;

        Ok((resolved, call, provider))
    }

    /// Non-streaming completion
    pub async fn dispatch(&self, request: &CompletionRequest) -> AppResult<Completion> {
        let (resolved, call, provider) = self.prepare(request)?;
        let descriptor = &resolved.descriptor;

        info!("Calling model: {} via {}", descriptor.display_name, provider.name());
        debug!("Provider call: {:?}", call);

        let started = Instant::now();
        let result = provider.chat_complete(&call).await;
        let elapsed = started.elapsed();

        let result = match result {
            Ok(response) => match response.choices.into_iter().next() {
                Some(choice) => Ok(Completion {
                    content: choice.message.text_content(),
                    usage: response.usage,
                }),
                None => Err(AppError::EmptyResponse),
            },
            Err(e) => Err(AppError::provider_failed(&descriptor.display_name, e)),
        };

        let outcome = match &result {
            Ok(_) => CallOutcome::success(&descriptor.display_name, &descriptor.key, elapsed),
            Err(e) => CallOutcome::failure(&descriptor.display_name, &descriptor.key, elapsed, e.user_message()),
        };
        self.telemetry.record(outcome);

        result
    }

    /// Streaming completion
    ///
    /// Resolution errors are returned before anything is spawned; failures after
    /// that arrive as the stream's terminal `Error` event.
    pub fn dispatch_stream(&self, request: &CompletionRequest) -> AppResult<ReceiverStream<StreamEvent>> {
        let (resolved, call, provider) = self.prepare(request)?;
        let descriptor = resolved.descriptor;

        info!("Streaming model: {} via {}", descriptor.display_name, provider.name());
        debug!("Provider call: {:?}", call);

        let label = StreamLabel {
            provider: descriptor.display_name,
            model_key: descriptor.key,
        };

        Ok(self.streaming.spawn(label, async move { provider.chat_stream(&call).await }))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("models", &self.registry.len())
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticCredentials;
    use crate::models::openai::OpenAIMessage;

    fn dispatcher(credentials: StaticCredentials) -> Dispatcher {
        let settings = Settings::from_lookup(|_| None).unwrap();
        let registry = Arc::new(ModelRegistry::builtin(&settings));
        Dispatcher::new(registry, Arc::new(credentials), &settings, Telemetry::default()).unwrap()
    }

    fn request(model_key: &str) -> CompletionRequest {
        CompletionRequest::new(model_key, vec![OpenAIMessage::user("hi")])
    }

    #[test]
    fn test_unknown_and_disabled_models() {
        let dispatcher = dispatcher(StaticCredentials::new().with("OPENAI_API_KEY", "sk-test"));
        assert!(matches!(dispatcher.resolve("nope"), Err(AppError::UnknownModel(_))));
        assert!(matches!(dispatcher.resolve("gpt-4o"), Err(AppError::UnknownModel(_))));
    }

    #[test]
    fn test_missing_credential_names_env_key() {
        let dispatcher = dispatcher(StaticCredentials::new());
        match dispatcher.resolve("qwen2.5-72b-instruct") {
            Err(AppError::MissingCredential { env_key, .. }) => assert_eq!(env_key, "DASHSCOPE_API_KEY"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(dispatcher.resolve("qwq").is_ok());
    }

    #[test]
    fn test_forced_temperature_wins() {
        let dispatcher = dispatcher(StaticCredentials::new().with("DASHSCOPE_API_KEY", "dash"));
        let resolved = dispatcher.resolve("qwen2.5-72b-instruct").unwrap();

        let call = dispatcher.build_call(&resolved, &request("qwen2.5-72b-instruct").temperature(1.3));
        assert_eq!(call.temperature, 0.1);
        assert_eq!(call.api_key.as_deref(), Some("dash"));
        assert_eq!(call.base_url.as_deref(), Some("https://dashscope.aliyuncs.com/compatible-mode/v1"));
    }

    #[test]
    fn test_defaults_fill_unset_parameters() {
        let dispatcher = dispatcher(StaticCredentials::new());
        let resolved = dispatcher.resolve("qwq").unwrap();

        let call = dispatcher.build_call(&resolved, &request("qwq"));
        assert_eq!(call.max_tokens, 1000);
        assert!((call.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(call.timeout, Duration::from_secs(60));

        let call = dispatcher.build_call(&resolved, &request("qwq").max_tokens(50).temperature(0.2).streaming());
        assert_eq!(call.max_tokens, 50);
        assert!((call.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(call.timeout, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_empty_messages_rejected() {
        let dispatcher = dispatcher(StaticCredentials::new());
        let request = CompletionRequest::new("qwq", Vec::new());
        assert!(matches!(dispatcher.dispatch(&request).await, Err(AppError::Validation(_))));
    }
}
