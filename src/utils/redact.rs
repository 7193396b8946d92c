//! Credential redaction
//!
//! Strips credential-shaped substrings from messages before they reach users or logs

use once_cell::sync::Lazy;
use regex::Regex;

/// Replacement text for anything that looks like a key
pub const REDACTED: &str = "[API_KEY_HIDDEN]";

// Anthropic first so its prefix is not half-consumed by the generic sk- pattern
static KEY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"sk-ant-[A-Za-z0-9_-]{20,}",
        r"sk-[A-Za-z0-9_-]{20,}",
        r"hf_[A-Za-z0-9]{20,}",
        r"(?i)\b[a-f0-9]{32,}\b",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Replace credential-shaped substrings with a placeholder
pub fn sanitize_error_message(message: &str) -> String {
    let mut cleaned = message.to_string();
    for pattern in KEY_PATTERNS.iter() {
        cleaned = pattern.replace_all(&cleaned, REDACTED).into_owned();
    }
    cleaned
}

/// Mask a secret for debug output, keeping a short prefix
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", prefix)
    }
}
