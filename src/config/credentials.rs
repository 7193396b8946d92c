//! Credential lookup
//!
//! Provider keys are resolved through a `CredentialProvider` on every use, so a key
//! rotated or removed at runtime takes effect on the next request.

use std::collections::HashMap;
use std::sync::RwLock;

/// Source of provider credentials
///
/// Implementations must return `None` for absent or empty values and must not cache:
/// every call reflects the current state of the underlying store.
pub trait CredentialProvider: Send + Sync {
    /// Look up a credential by its key name
    fn get(&self, key: &str) -> Option<String>;

    /// Whether a non-empty credential exists for `key`
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Reads credentials from the live process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

/// In-memory credential store, mutable at runtime
#[derive(Debug, Default)]
pub struct StaticCredentials {
    values: RwLock<HashMap<String, String>>,
}

impl StaticCredentials {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a credential
    pub fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    /// Remove a credential
    pub fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .ok()
            .and_then(|values| values.get(key).cloned())
            .filter(|v| !v.trim().is_empty())
    }
}
