//! Model registry and selection policy tests

use llmgate::config::{ModelDescriptor, ModelRegistry, ProviderKind, Settings, StaticCredentials};
use llmgate::services::{choose_default_model, choose_lightweight_model};
use llmgate::AppError;
use std::io::Write;
use tempfile::NamedTempFile;

fn default_settings() -> Settings {
    Settings::from_lookup(|_| None).unwrap()
}

fn write_registry(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

fn keys(models: &[&ModelDescriptor]) -> Vec<String> {
    models.iter().map(|m| m.key.clone()).collect()
}

#[test]
fn test_builtin_catalog_without_credentials() {
    let registry = ModelRegistry::builtin(&default_settings());
    assert_eq!(registry.len(), 7);

    // Only the keyless local model is usable
    let enabled = registry.list_enabled(&StaticCredentials::new());
    assert_eq!(keys(&enabled), vec!["qwq"]);
}

#[test]
fn test_list_enabled_follows_credentials_and_order() {
    let registry = ModelRegistry::builtin(&default_settings());
    let credentials = StaticCredentials::new()
        .with("HF_TOKEN", "hf_test")
        .with("DASHSCOPE_API_KEY", "dash")
        .with("OPENAI_API_KEY", "sk-test");

    // gpt-4o is disabled in the catalog regardless of its key
    let enabled = registry.list_enabled(&credentials);
    assert_eq!(keys(&enabled), vec!["qwen2.5-72b-instruct", "DeepSeek-R1", "qwq"]);

    credentials.remove("DASHSCOPE_API_KEY");
    assert_eq!(keys(&registry.list_enabled(&credentials)), vec!["DeepSeek-R1", "qwq"]);
}

#[test]
fn test_builtin_descriptors() {
    let settings = Settings::from_lookup(|key| match key {
        "AZURE_API_BASE" => Some("https://example.openai.azure.com".to_string()),
        _ => None,
    })
    .unwrap();
    let registry = ModelRegistry::builtin(&settings);

    let azure = registry.lookup("azure-gpt-4o").unwrap();
    assert_eq!(azure.wire_protocol(), ProviderKind::Azure);
    assert_eq!(azure.forced_temperature, Some(0.1));
    assert_eq!(azure.base_url.as_deref(), Some("https://example.openai.azure.com"));

    let deepseek = registry.lookup("DeepSeek-R1").unwrap();
    assert_eq!(deepseek.wire_protocol(), ProviderKind::Huggingface);
    assert_eq!(deepseek.credential_env_key, "HF_TOKEN");

    assert!(registry.lookup("baichuan4").unwrap().forced_temperature.is_none());
    assert!(registry.lookup("unknown").is_none());
}

#[test]
fn test_load_registry_file() {
    let file = write_registry(
        r#"{
            "models": [
                {
                    "key": "local",
                    "displayName": "Local Llama",
                    "providerKind": "ollama",
                    "underlyingModelId": "llama3",
                    "credentialEnvKey": "OLLAMA_API_KEY",
                    "baseUrl": "http://localhost:11434",
                    "timeoutSecs": 30
                },
                {
                    "key": "mini",
                    "displayName": "Mini",
                    "providerKind": "openai",
                    "underlyingModelId": "gpt-4o-mini",
                    "credentialEnvKey": "OPENAI_API_KEY",
                    "enabled": false
                }
            ]
        }"#,
    );

    let registry = ModelRegistry::load(file.path()).unwrap();
    assert_eq!(registry.len(), 2);

    let local = registry.lookup("local").unwrap();
    assert_eq!(local.provider_kind, ProviderKind::Ollama);
    assert_eq!(local.timeout_secs, Some(30));
    assert!(local.enabled);

    let mini = registry.lookup("mini").unwrap();
    assert_eq!(mini.provider_kind, ProviderKind::OpenaiCompatible);
    assert!(!mini.enabled);
}

#[test]
fn test_file_models_get_low_variance_temperature() {
    let file = write_registry(
        r#"{
            "models": [
                {"key":"qwen-max","displayName":"Qwen Max","providerKind":"openai","underlyingModelId":"qwen-max","credentialEnvKey":"DASHSCOPE_API_KEY"},
                {"key":"deploy","displayName":"Azure Deployment","providerKind":"azure","underlyingModelId":"gpt-4o","credentialEnvKey":"AZURE_API_KEY"},
                {"key":"pinned","displayName":"Pinned Qwen","providerKind":"openai","underlyingModelId":"Qwen-Plus","credentialEnvKey":"DASHSCOPE_API_KEY","forcedTemperature":0.5},
                {"key":"plain","displayName":"Plain","providerKind":"openai","underlyingModelId":"gpt-4o-mini","credentialEnvKey":"OPENAI_API_KEY"}
            ]
        }"#,
    );

    let registry = ModelRegistry::load(file.path()).unwrap();
    assert_eq!(registry.lookup("qwen-max").unwrap().forced_temperature, Some(0.1));
    assert_eq!(registry.lookup("deploy").unwrap().forced_temperature, Some(0.1));
    assert_eq!(registry.lookup("pinned").unwrap().forced_temperature, Some(0.5));
    assert!(registry.lookup("plain").unwrap().forced_temperature.is_none());
}

#[test]
fn test_models_file_setting_wins() {
    let file = write_registry(
        r#"{"models":[{"key":"only","displayName":"Only","providerKind":"anthropic","underlyingModelId":"claude","credentialEnvKey":"ANTHROPIC_API_KEY"}]}"#,
    );
    let path = file.path().to_string_lossy().to_string();
    let settings = Settings::from_lookup(move |key| (key == "MODELS_FILE").then(|| path.clone())).unwrap();

    let registry = ModelRegistry::load_default(&settings).unwrap();
    assert_eq!(registry.len(), 1);
    assert!(registry.lookup("only").is_some());
}

#[test]
fn test_invalid_registry_files_rejected() {
    let entry = |key: &str, extra: &str| {
        format!(
            r#"{{"key":"{}","displayName":"X","providerKind":"ollama","underlyingModelId":"m","credentialEnvKey":"K"{}}}"#,
            key, extra
        )
    };

    let cases = vec![
        format!(r#"{{"models":[{},{}]}}"#, entry("dup", ""), entry("dup", "")),
        format!(r#"{{"models":[{}]}}"#, entry("", "")),
        format!(r#"{{"models":[{}]}}"#, entry("a", r#","baseUrl":"ftp://host""#)),
        format!(r#"{{"models":[{}]}}"#, entry("a", r#","forcedTemperature":-1.0"#)),
        format!(r#"{{"models":[{}]}}"#, entry("a", r#","timeoutSecs":0"#)),
        r#"{"models":[{"key":"a","displayName":"X","providerKind":"gemini","underlyingModelId":"m","credentialEnvKey":"K"}]}"#
            .to_string(),
        "not json".to_string(),
    ];

    for json in cases {
        let file = write_registry(&json);
        assert!(ModelRegistry::load(file.path()).is_err(), "should reject: {}", json);
    }
}

#[test]
fn test_default_model_policy() {
    let gpt4o = ModelDescriptor::new("GPT-4o", "GPT-4o", ProviderKind::OpenaiCompatible, "gpt-4o", "OPENAI_API_KEY");
    let qwq = ModelDescriptor::new("qwq", "QwQ", ProviderKind::Ollama, "qwq", "OLLAMA_API_KEY");

    assert_eq!(choose_default_model(&[&qwq, &gpt4o]).unwrap(), "GPT-4o");
    assert_eq!(choose_default_model(&[&qwq]).unwrap(), "qwq");
    assert!(matches!(choose_default_model(&[]), Err(AppError::NoModelAvailable)));
}

#[test]
fn test_lightweight_model_policy() {
    let make = |key: &str| ModelDescriptor::new(key, key, ProviderKind::OpenaiCompatible, key, "KEY");
    let mini = make("gpt-4o-mini");
    let turbo = make("gpt-3.5-turbo");
    let qwen = make("qwen2.5-72b-instruct");
    let other = make("DeepSeek-R1");

    // Priority list order wins over registry order
    assert_eq!(choose_lightweight_model(&[&qwen, &turbo, &mini]).unwrap(), "gpt-4o-mini");
    assert_eq!(choose_lightweight_model(&[&qwen, &turbo]).unwrap(), "gpt-3.5-turbo");
    assert_eq!(choose_lightweight_model(&[&other, &qwen]).unwrap(), "qwen2.5-72b-instruct");
    assert_eq!(choose_lightweight_model(&[&other]).unwrap(), "DeepSeek-R1");
    assert!(matches!(choose_lightweight_model(&[]), Err(AppError::NoModelAvailable)));
}
