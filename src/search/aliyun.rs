//! Aliyun IQS unified search backend (the `kuake` engine)
//!
//! Requests are signed with ACS3-HMAC-SHA256.

use super::{SearchBackend, SearchError, SearchResult};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Signature algorithm name
pub const SIGNATURE_ALGORITHM: &str = "ACS3-HMAC-SHA256";

const API_ACTION: &str = "UnifiedSearch";
const API_VERSION: &str = "2024-11-11";
const API_PATH: &str = "/search/unified";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnifiedSearchResponse {
    #[serde(default)]
    page_items: Vec<PageItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    published_time: Option<String>,
    #[serde(default)]
    rerank_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "Code")]
    code: Option<String>,
    #[serde(default, alias = "Message")]
    message: Option<String>,
}

/// Lowercase hex SHA-256
fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Headers of a signed request, `authorization` last
///
/// Pure function of its inputs so signatures can be checked against known values.
#[allow(clippy::too_many_arguments)]
pub fn sign_request(
    access_key_id: &str,
    access_key_secret: &str,
    method: &str,
    host: &str,
    path: &str,
    body: &[u8],
    date: &str,
    nonce: &str,
) -> Result<Vec<(String, String)>, SearchError> {
    let mut headers = vec![
        ("content-type".to_string(), "application/json".to_string()),
        ("host".to_string(), host.to_string()),
        ("x-acs-action".to_string(), API_ACTION.to_string()),
        ("x-acs-content-sha256".to_string(), sha256_hex(body)),
        ("x-acs-date".to_string(), date.to_string()),
        ("x-acs-signature-nonce".to_string(), nonce.to_string()),
        ("x-acs-version".to_string(), API_VERSION.to_string()),
    ];
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    // No query string on this API
    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method,
        path,
        canonical_headers,
        signed_headers,
        sha256_hex(body)
    );
    let string_to_sign = format!("{}\n{}", SIGNATURE_ALGORITHM, sha256_hex(canonical_request.as_bytes()));

    let mut mac = HmacSha256::new_from_slice(access_key_secret.as_bytes())
        .map_err(|e| SearchError::backend("kuake", e))?;
    mac.update(string_to_sign.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    headers.push((
        "authorization".to_string(),
        format!(
            "{} Credential={},SignedHeaders={},Signature={}",
            SIGNATURE_ALGORITHM, access_key_id, signed_headers, signature
        ),
    ));

    Ok(headers)
}

/// Aliyun IQS client
pub struct AliyunSearch {
    client: Client,
    access_key_id: String,
    access_key_secret: String,
    endpoint: String,
    scheme: &'static str,
}

impl AliyunSearch {
    /// Create a client for `endpoint` (a bare host name)
    pub fn new(access_key_id: &str, access_key_secret: &str, endpoint: &str, timeout: Duration) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::backend("kuake", e))?;

        // An explicit scheme is only expected from local test servers
        let (scheme, host) = match endpoint.split_once("://") {
            Some(("http", host)) => ("http", host),
            Some((_, host)) => ("https", host),
            None => ("https", endpoint),
        };

        Ok(Self {
            client,
            access_key_id: access_key_id.to_string(),
            access_key_secret: access_key_secret.to_string(),
            endpoint: host.trim_end_matches('/').to_string(),
            scheme,
        })
    }

    fn map_items(keyword: &str, items: Vec<PageItem>, max_results: usize) -> Vec<SearchResult> {
        items
            .into_iter()
            .filter(|item| item.link.as_deref().is_some_and(|link| !link.is_empty()))
            .take(max_results)
            .map(|item| SearchResult {
                title: item.title.unwrap_or_default(),
                url: item.link.unwrap_or_default(),
                snippet: item
                    .snippet
                    .filter(|s| !s.is_empty())
                    .or(item.summary)
                    .unwrap_or_default(),
                source_keyword: keyword.to_string(),
                published_time: item.published_time.filter(|t| !t.is_empty()),
                relevance_score: item.rerank_score,
            })
            .collect()
    }
}

#[async_trait]
impl SearchBackend for AliyunSearch {
    fn name(&self) -> &str {
        "kuake"
    }

    async fn search(&self, keyword: &str, max_results: usize) -> Result<Vec<SearchResult>, SearchError> {
        debug!("Aliyun IQS search: {}", keyword);

        let body = json!({
            "query": keyword,
            "timeRange": "NoLimit",
            "contents": { "summary": true, "mainText": true },
        })
        .to_string();

        let date = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let headers = sign_request(
            &self.access_key_id,
            &self.access_key_secret,
            "POST",
            &self.endpoint,
            API_PATH,
            body.as_bytes(),
            &date,
            &nonce,
        )?;

        let url = format!("{}://{}{}", self.scheme, self.endpoint, API_PATH);
        let mut request = self.client.post(url).body(body);
        for (name, value) in &headers {
            // reqwest derives host from the URL
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.send().await.map_err(|e| SearchError::backend("kuake", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .filter(|e| e.code.is_some() || e.message.is_some())
                .map(|e| format!("{} - {}", e.code.unwrap_or_default(), e.message.unwrap_or_default()))
                .unwrap_or(text);
            return Err(SearchError::backend("kuake", format!("status {}: {}", status, detail)));
        }

        let body: UnifiedSearchResponse = response.json().await.map_err(|e| SearchError::backend("kuake", e))?;
        Ok(Self::map_items(keyword, body.page_items, max_results))
    }
}
