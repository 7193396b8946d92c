//! Bing Web Search v7 backend

use super::{SearchBackend, SearchError, SearchResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Public Bing endpoint
pub const BING_SEARCH_URL: &str = "https://api.bing.microsoft.com/v7.0/search";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingResponse {
    #[serde(default)]
    web_pages: Option<BingWebPages>,
}

#[derive(Debug, Deserialize)]
struct BingWebPages {
    #[serde(default)]
    value: Vec<BingWebPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingWebPage {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date_last_crawled: Option<String>,
}

/// Bing search client
pub struct BingSearch {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl BingSearch {
    /// Create a client against the public endpoint
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self, SearchError> {
        Self::with_endpoint(api_key, BING_SEARCH_URL, timeout)
    }

    /// Create a client against a custom endpoint
    pub fn with_endpoint(api_key: &str, endpoint: &str, timeout: Duration) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::backend("bing", e))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl SearchBackend for BingSearch {
    fn name(&self) -> &str {
        "bing"
    }

    async fn search(&self, keyword: &str, max_results: usize) -> Result<Vec<SearchResult>, SearchError> {
        debug!("Bing search: {}", keyword);

        let count = max_results.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .query(&[
                ("q", keyword),
                ("count", count.as_str()),
                ("offset", "0"),
                ("mkt", "zh-CN"),
                ("safesearch", "Moderate"),
            ])
            .send()
            .await
            .map_err(|e| SearchError::backend("bing", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::backend("bing", format!("status {}: {}", status, body)));
        }

        let body: BingResponse = response.json().await.map_err(|e| SearchError::backend("bing", e))?;

        Ok(body
            .web_pages
            .map(|pages| pages.value)
            .unwrap_or_default()
            .into_iter()
            .take(max_results)
            .map(|page| SearchResult {
                title: page.name,
                url: page.url,
                snippet: page.snippet,
                source_keyword: keyword.to_string(),
                published_time: page.date_last_crawled,
                relevance_score: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_mapping() {
        let body: BingResponse = serde_json::from_str(
            r#"{"_type":"SearchResponse","webPages":{"value":[{"name":"Rust","url":"https://www.rust-lang.org/","snippet":"A language"}]}}"#,
        )
        .unwrap();
        let pages = body.web_pages.unwrap().value;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].name, "Rust");

        let empty: BingResponse = serde_json::from_str(r#"{"_type":"SearchResponse"}"#).unwrap();
        assert!(empty.web_pages.is_none());
    }
}
