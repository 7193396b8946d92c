//! Web search augmentation
//!
//! Backends, result handling and the pipeline that turns a user query into a
//! search-grounded prompt.

pub mod aliyun;
pub mod backends;
pub mod bing;
pub mod pipeline;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use aliyun::AliyunSearch;
pub use backends::SearchBackends;
pub use bing::BingSearch;
pub use pipeline::{parse_keywords, Augmentation, Degradation, KeywordExtractor, LlmKeywordExtractor, SearchPipeline};

/// Sentence used as the search context when nothing was found
pub const NO_RESULTS_FOUND: &str = "No relevant web search results were found.";

/// Search engine identifiers accepted by `DEFAULT_SEARCH_ENGINE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    /// Bing Web Search
    Bing,
    /// Aliyun IQS unified search
    Kuake,
}

impl SearchEngine {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::Bing => "bing",
            SearchEngine::Kuake => "kuake",
        }
    }

    /// The other engine, tried when this one is unavailable
    pub fn other(&self) -> Self {
        match self {
            SearchEngine::Bing => SearchEngine::Kuake,
            SearchEngine::Kuake => SearchEngine::Bing,
        }
    }
}

impl fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchEngine {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bing" => Ok(SearchEngine::Bing),
            "kuake" | "aliyun" => Ok(SearchEngine::Kuake),
            other => Err(SearchError::UnknownEngine(other.to_string())),
        }
    }
}

/// Search-side failures; none of them leave the pipeline
#[derive(Error, Debug)]
pub enum SearchError {
    /// Engine name not recognized
    #[error("Unknown search engine: {0}")]
    UnknownEngine(String),

    /// No backend configured or reachable
    #[error("No search backend is available")]
    BackendUnavailable,

    /// Keyword extraction call failed
    #[error("Keyword extraction failed: {0}")]
    KeywordExtraction(String),

    /// A backend call failed
    #[error("{backend} search failed: {message}")]
    Backend {
        /// Backend name
        backend: String,
        /// Failure description
        message: String,
    },
}

impl SearchError {
    /// Backend failure from any displayable error
    pub fn backend(backend: &str, error: impl fmt::Display) -> Self {
        SearchError::Backend {
            backend: backend.to_string(),
            message: crate::utils::redact::sanitize_error_message(&format!("{:#}", error)),
        }
    }
}

/// One web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Page title
    pub title: String,
    /// Page URL, the deduplication key
    pub url: String,
    /// Short excerpt
    pub snippet: String,
    /// Keyword whose query produced this hit
    pub source_keyword: String,
    /// Publication time as reported by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_time: Option<String>,
    /// Backend relevance score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

/// A pluggable web search API
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Query one keyword, returning at most `max_results` hits
    async fn search(&self, keyword: &str, max_results: usize) -> Result<Vec<SearchResult>, SearchError>;
}

/// Drop repeated URLs (first wins) and stop once `max_results` remain
pub fn dedup_results(results: Vec<SearchResult>, max_results: usize) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for result in results {
        if unique.len() >= max_results {
            break;
        }
        if result.url.is_empty() || !seen.insert(result.url.clone()) {
            continue;
        }
        unique.push(result);
    }

    unique
}

/// Render results as numbered blocks for the model
pub fn format_search_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return NO_RESULTS_FOUND.to_string();
    }

    let mut context = String::from("The following web search results are relevant:\n\n");
    for (i, result) in results.iter().enumerate() {
        context.push_str(&format!("[Search result {}]\n", i + 1));
        context.push_str(&format!("Title: {}\n", result.title));
        context.push_str(&format!("Snippet: {}\n", result.snippet));
        context.push_str(&format!("Source: {}\n\n", result.url));
    }

    context
}

/// Wrap the query and its search context in the answering instructions
pub fn build_augmented_prompt(user_query: &str, search_context: &str) -> String {
    format!(
        "You are a professional AI assistant who answers with accurate, comprehensive information based on the latest web sources.

User question: {user_query}

{search_context}

Answer the user's question in detail based on the search results above. Requirements:

1. **Integrate**: combine information from several results into one complete answer
2. **Recency**: prefer the most recent information, and take particular care with time-sensitive topics
3. **Accuracy**: make sure the information is correct and state clearly where you are uncertain
4. **Structure**: organize the answer clearly with key points and supporting detail
5. **Cite sources**: reference the sources of the search results where appropriate
6. **Neutrality**: stay objective and neutral and avoid unsupported opinions

If the search results do not match the question well, answer from your own knowledge and explain the limits of the available sources.

Begin your answer:"
    )
}
