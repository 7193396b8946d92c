//! Search augmentation pipeline
//!
//! Keyword extraction, per-keyword backend queries, deduplication and prompt
//! synthesis. Every failure degrades instead of propagating: the worst case is
//! the untouched user query with no results.

use super::{build_augmented_prompt, dedup_results, format_search_context, SearchBackend, SearchBackends, SearchError, SearchResult};
use crate::models::chat::CompletionRequest;
use crate::models::openai::OpenAIMessage;
use crate::services::retry::{retry_with_backoff, RetryConfig};
use crate::services::Dispatcher;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Most keywords used per query
pub const MAX_KEYWORDS: usize = 4;

/// Token cap of the extraction call
pub const EXTRACTION_MAX_TOKENS: u32 = 100;

/// Temperature of the extraction call
pub const EXTRACTION_TEMPERATURE: f32 = 0.3;

/// Produces search keywords for a user query
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    /// Keywords for `user_query`, at least one on success
    async fn extract(&self, user_query: &str) -> Result<Vec<String>, SearchError>;
}

/// Instructions for the extraction call
pub fn keyword_prompt(user_query: &str) -> String {
    format!(
        "You are a professional search-intent analyst. Analyze the user's query and extract the keywords best suited for a web search.

User query: {user_query}

Requirements:
1. Identify the core topic and key information of the query
2. Extract 2-4 of the most relevant search keywords
3. Keywords must be concise, precise and suitable for a search engine
4. Include time-related words when the query is time-sensitive
5. Return only the keywords separated by commas, with no explanation

Examples:
User query: \"How is artificial intelligence developing in 2024?\"
Output: artificial intelligence,2024,development trends,AI technology

User query: \"Apple's latest earnings report\"
Output: Apple,latest earnings,quarterly results,Apple earnings

Now analyze the user query above and output the keywords:"
    )
}

/// Split a comma-separated model reply into at most four keywords
pub fn parse_keywords(text: &str) -> Vec<String> {
    text.split([',', '，'])
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

/// Asks the lightweight model for keywords
pub struct LlmKeywordExtractor {
    dispatcher: Arc<Dispatcher>,
}

impl LlmKeywordExtractor {
    /// Create an extractor dispatching through `dispatcher`
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl KeywordExtractor for LlmKeywordExtractor {
    async fn extract(&self, user_query: &str) -> Result<Vec<String>, SearchError> {
        let model_key = self
            .dispatcher
            .lightweight_model_key()
            .map_err(|e| SearchError::KeywordExtraction(e.user_message()))?;
        debug!("Extracting search keywords with {}", model_key);

        let request = CompletionRequest::new(model_key, vec![OpenAIMessage::user(keyword_prompt(user_query))])
            .max_tokens(EXTRACTION_MAX_TOKENS)
            .temperature(EXTRACTION_TEMPERATURE);

        let completion = self
            .dispatcher
            .dispatch(&request)
            .await
            .map_err(|e| SearchError::KeywordExtraction(e.user_message()))?;

        let keywords = parse_keywords(&completion.content);
        if keywords.is_empty() {
            return Err(SearchError::KeywordExtraction("model returned no keywords".to_string()));
        }
        Ok(keywords)
    }
}

/// A fallback the pipeline took instead of failing
#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    /// Keyword extraction failed; the raw query was searched instead
    KeywordExtractionFailed(String),
    /// No backend is configured; nothing was searched
    NoSearchBackend,
    /// One keyword's query failed and was skipped
    KeywordSearchFailed {
        /// Keyword that failed
        keyword: String,
        /// Failure description
        message: String,
    },
    /// The pipeline itself failed; the raw query is returned unaugmented
    PipelineFailed(String),
}

/// Pipeline output
#[derive(Debug, Clone)]
pub struct Augmentation {
    /// Prompt to send instead of the user query
    pub prompt: String,
    /// Deduplicated results the prompt was built from
    pub results: Vec<SearchResult>,
    /// Fallbacks taken along the way
    pub degradations: Vec<Degradation>,
}

impl Augmentation {
    /// Whether any fallback was taken
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    fn unaugmented(user_query: &str, reason: String) -> Self {
        Self {
            prompt: user_query.to_string(),
            results: Vec::new(),
            degradations: vec![Degradation::PipelineFailed(reason)],
        }
    }
}

/// Search augmentation pipeline
pub struct SearchPipeline {
    extractor: Arc<dyn KeywordExtractor>,
    backends: SearchBackends,
    max_results: usize,
    retry: RetryConfig,
}

impl SearchPipeline {
    /// Create a pipeline
    pub fn new(extractor: Arc<dyn KeywordExtractor>, backends: SearchBackends, max_results: usize, retry: RetryConfig) -> Self {
        Self {
            extractor,
            backends,
            max_results,
            retry,
        }
    }

    /// Backends the pipeline searches with
    pub fn backends(&self) -> &SearchBackends {
        &self.backends
    }

    /// Augment `user_query` with web results; never fails
    pub async fn augment(&self, user_query: &str) -> Augmentation {
        match AssertUnwindSafe(self.run(user_query)).catch_unwind().await {
            Ok(augmentation) => augmentation,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!("Web search augmentation failed: {}", reason);
                Augmentation::unaugmented(user_query, reason)
            }
        }
    }

    async fn run(&self, user_query: &str) -> Augmentation {
        let mut degradations = Vec::new();

        let keywords = match self.extractor.extract(user_query).await {
            Ok(keywords) => keywords,
            Err(e) => {
                warn!("{}, searching the raw query", e);
                degradations.push(Degradation::KeywordExtractionFailed(e.to_string()));
                vec![user_query.to_string()]
            }
        };
        info!("Search keywords: {:?}", keywords);

        let results = match self.backends.select() {
            Some(backend) => self.search(backend.as_ref(), &keywords, &mut degradations).await,
            None => {
                error!("{}", SearchError::BackendUnavailable);
                degradations.push(Degradation::NoSearchBackend);
                Vec::new()
            }
        };

        let context = format_search_context(&results);
        Augmentation {
            prompt: build_augmented_prompt(user_query, &context),
            results,
            degradations,
        }
    }

    /// Query each keyword in turn until enough unique results are collected
    async fn search(
        &self,
        backend: &dyn SearchBackend,
        keywords: &[String],
        degradations: &mut Vec<Degradation>,
    ) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = Vec::new();

        for keyword in keywords {
            if results.len() >= self.max_results {
                break;
            }

            let label = format!("{} search for '{}'", backend.name(), keyword);
            let max_results = self.max_results;
            let query = move || backend.search(keyword, max_results);

            match retry_with_backoff(&self.retry, &label, query).await {
                Ok(hits) => {
                    results.extend(hits);
                    results = dedup_results(results, self.max_results);
                }
                Err(e) => {
                    error!("Search for keyword '{}' failed: {}", keyword, e);
                    degradations.push(Degradation::KeywordSearchFailed {
                        keyword: keyword.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!("Got {} search results from {}", results.len(), backend.name());
        results
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SearchEngine, NO_RESULTS_FOUND};

    struct FixedKeywords(Vec<&'static str>);

    #[async_trait]
    impl KeywordExtractor for FixedKeywords {
        async fn extract(&self, _user_query: &str) -> Result<Vec<String>, SearchError> {
            Ok(self.0.iter().map(|k| k.to_string()).collect())
        }
    }

    struct PanickingExtractor;

    #[async_trait]
    impl KeywordExtractor for PanickingExtractor {
        async fn extract(&self, _user_query: &str) -> Result<Vec<String>, SearchError> {
            panic!("extractor exploded");
        }
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_keywords(" rust , async,, tokio ,axum,tower"), vec!["rust", "async", "tokio", "axum"]);
        assert_eq!(parse_keywords("人工智能，2024年"), vec!["人工智能", "2024年"]);
        assert!(parse_keywords(" , ").is_empty());
    }

    #[test]
    fn test_keyword_prompt_contains_query() {
        assert!(keyword_prompt("latest rust release").contains("User query: latest rust release"));
    }

    #[tokio::test]
    async fn test_no_backend_degrades() {
        let pipeline = SearchPipeline::new(
            Arc::new(FixedKeywords(vec!["rust"])),
            SearchBackends::new(SearchEngine::Bing),
            5,
            RetryConfig::none(),
        );

        let augmentation = pipeline.augment("what is rust").await;
        assert!(augmentation.prompt.contains("what is rust"));
        assert!(augmentation.prompt.contains(NO_RESULTS_FOUND));
        assert_eq!(augmentation.degradations, vec![Degradation::NoSearchBackend]);
    }

    #[tokio::test]
    async fn test_panic_returns_raw_query() {
        let pipeline = SearchPipeline::new(
            Arc::new(PanickingExtractor),
            SearchBackends::new(SearchEngine::Bing),
            5,
            RetryConfig::none(),
        );

        let augmentation = pipeline.augment("what is rust").await;
        assert_eq!(augmentation.prompt, "what is rust");
        assert!(augmentation.results.is_empty());
        assert!(matches!(&augmentation.degradations[0], Degradation::PipelineFailed(m) if m.contains("exploded")));
    }
}
