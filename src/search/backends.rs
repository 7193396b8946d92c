//! Search backend capability registry
//!
//! Each backend is registered at startup only when its credentials are present
//! and its client could be built; selection never probes anything at request time.

use super::{AliyunSearch, BingSearch, SearchBackend, SearchEngine};
use crate::config::Settings;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Available search backends and the preferred one
#[derive(Clone)]
pub struct SearchBackends {
    default_engine: SearchEngine,
    backends: HashMap<SearchEngine, Arc<dyn SearchBackend>>,
}

impl SearchBackends {
    /// Empty registry preferring `default_engine`
    pub fn new(default_engine: SearchEngine) -> Self {
        Self {
            default_engine,
            backends: HashMap::new(),
        }
    }

    /// Register every backend whose credentials are configured
    pub fn from_settings(settings: &Settings) -> Self {
        let search = &settings.search;
        let timeout = settings.search_timeout();
        let mut registry = Self::new(search.default_engine);

        match &search.bing_api_key {
            Some(api_key) => match BingSearch::new(api_key, timeout) {
                Ok(backend) => registry.register(SearchEngine::Bing, Arc::new(backend)),
                Err(e) => warn!("Bing search unavailable: {}", e),
            },
            None => info!("BING_SEARCH_API_KEY not set, Bing search disabled"),
        }

        match (&search.aliyun_access_key_id, &search.aliyun_access_key_secret) {
            (Some(id), Some(secret)) => match AliyunSearch::new(id, secret, &search.aliyun_endpoint, timeout) {
                Ok(backend) => registry.register(SearchEngine::Kuake, Arc::new(backend)),
                Err(e) => warn!("Aliyun IQS search unavailable: {}", e),
            },
            _ => info!("Aliyun access keys not set, IQS search disabled"),
        }

        match registry.active_engine() {
            Some(engine) if engine != registry.default_engine => {
                warn!("Default search engine {} is not configured, using {}", registry.default_engine, engine)
            }
            Some(engine) => info!("Search engine: {}", engine),
            None => error!("No search engine is configured"),
        }

        registry
    }

    /// Register a backend
    pub fn with_backend(mut self, engine: SearchEngine, backend: Arc<dyn SearchBackend>) -> Self {
        self.register(engine, backend);
        self
    }

    fn register(&mut self, engine: SearchEngine, backend: Arc<dyn SearchBackend>) {
        self.backends.insert(engine, backend);
    }

    /// Whether `engine` was registered
    pub fn is_available(&self, engine: SearchEngine) -> bool {
        self.backends.contains_key(&engine)
    }

    /// Engine that `select` would use
    pub fn active_engine(&self) -> Option<SearchEngine> {
        [self.default_engine, self.default_engine.other()]
            .into_iter()
            .find(|engine| self.is_available(*engine))
    }

    /// The default backend, else the other one, else none
    pub fn select(&self) -> Option<Arc<dyn SearchBackend>> {
        let engine = self.active_engine()?;
        self.backends.get(&engine).cloned()
    }
}

impl fmt::Debug for SearchBackends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchBackends")
            .field("default_engine", &self.default_engine)
            .field("available", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}
