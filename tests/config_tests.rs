//! Configuration module tests

use llmgate::config::{CredentialProvider, Settings, StaticCredentials};
use llmgate::search::SearchEngine;
use std::collections::HashMap;
use std::time::Duration;

/// Settings from a fixed set of key/value pairs
fn settings_from(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Settings::from_lookup(move |key| vars.get(key).cloned())
}

#[test]
fn test_defaults() {
    let settings = settings_from(&[]).unwrap();

    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 5000);
    assert_eq!(settings.completion.max_tokens, 1000);
    assert!((settings.completion.temperature - 0.7).abs() < f32::EPSILON);
    assert_eq!(settings.providers.azure_api_version, "2024-02-15-preview");
    assert_eq!(settings.providers.ollama_base_url, "http://localhost:11434");
    assert_eq!(settings.provider_timeout(), Duration::from_secs(60));
    assert_eq!(settings.provider_stream_timeout(), Duration::from_secs(300));
    assert_eq!(settings.search.default_engine, SearchEngine::Bing);
    assert_eq!(settings.search.max_results, 5);
    assert_eq!(settings.search_timeout(), Duration::from_secs(10));
    assert_eq!(settings.search.aliyun_endpoint, "iqs.cn-zhangjiakou.aliyuncs.com");
    assert_eq!(settings.retry.max_retries, 2);
    assert_eq!(settings.logging.level, "info");
    assert_eq!(settings.logging.format, "text");
    assert!(settings.logging.telemetry_log.is_none());
    assert!(settings.models_file.is_none());
}

#[test]
fn test_overrides() {
    let settings = settings_from(&[
        ("SERVER_HOST", "0.0.0.0"),
        ("SERVER_PORT", "8080"),
        ("MAX_TOKENS", "2048"),
        ("TEMPERATURE", "0.2"),
        ("AZURE_API_BASE", "https://example.openai.azure.com"),
        ("PROVIDER_TIMEOUT", "5"),
        ("DEFAULT_SEARCH_ENGINE", "kuake"),
        ("SEARCH_MAX_RESULTS", "8"),
        ("RUST_LOG", "llmgate=debug,tower_http=info"),
        ("LOG_FORMAT", "json"),
        ("TELEMETRY_LOG", "/tmp/calls.jsonl"),
        ("RETRY_MAX_RETRIES", "0"),
    ])
    .unwrap();

    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.completion.max_tokens, 2048);
    assert_eq!(settings.providers.azure_api_base.as_deref(), Some("https://example.openai.azure.com"));
    assert_eq!(settings.provider_timeout(), Duration::from_secs(5));
    assert_eq!(settings.search.default_engine, SearchEngine::Kuake);
    assert_eq!(settings.search.max_results, 8);
    assert_eq!(settings.logging.format, "json");
    assert!(settings.logging.telemetry_log.is_some());
    assert_eq!(settings.retry.max_retries, 0);
}

#[test]
fn test_blank_values_use_defaults() {
    let settings = settings_from(&[("SERVER_PORT", "  "), ("BING_SEARCH_API_KEY", "")]).unwrap();
    assert_eq!(settings.server.port, 5000);
    assert!(settings.search.bing_api_key.is_none());
}

#[test]
fn test_invalid_values_fail() {
    let cases: &[(&str, &str)] = &[
        ("SERVER_PORT", "0"),
        ("SERVER_PORT", "not-a-port"),
        ("MAX_TOKENS", "0"),
        ("TEMPERATURE", "3.5"),
        ("PROVIDER_TIMEOUT", "0"),
        ("SEARCH_TIMEOUT", "0"),
        ("SEARCH_MAX_RESULTS", "0"),
        ("AZURE_API_BASE", "example.openai.azure.com"),
        ("OLLAMA_BASE_URL", "localhost:11434"),
        ("DEFAULT_SEARCH_ENGINE", "google"),
        ("RUST_LOG", "loud"),
        ("LOG_FORMAT", "xml"),
    ];

    for (key, value) in cases {
        assert!(settings_from(&[(key, value)]).is_err(), "{}={} should be rejected", key, value);
    }
}

#[test]
fn test_search_secrets_not_serialized() {
    let settings = settings_from(&[
        ("BING_SEARCH_API_KEY", "bing-secret-value"),
        ("ALIYUN_ACCESS_KEY_SECRET", "aliyun-secret-value"),
    ])
    .unwrap();

    let json = serde_json::to_string(&settings).unwrap();
    assert!(!json.contains("bing-secret-value"));
    assert!(!json.contains("aliyun-secret-value"));
}

#[test]
fn test_static_credentials_are_live() {
    let credentials = StaticCredentials::new().with("OPENAI_API_KEY", "sk-one");
    assert_eq!(credentials.get("OPENAI_API_KEY").as_deref(), Some("sk-one"));

    credentials.set("OPENAI_API_KEY", "sk-two");
    assert_eq!(credentials.get("OPENAI_API_KEY").as_deref(), Some("sk-two"));

    credentials.remove("OPENAI_API_KEY");
    assert!(!credentials.has("OPENAI_API_KEY"));

    credentials.set("HF_TOKEN", "");
    assert!(credentials.get("HF_TOKEN").is_none());
}
