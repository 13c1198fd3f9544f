// src/providers/tavily.rs
//
// Tavily search + extract adapter. Tavily's API is built for agent
// workloads: /search returns title/url/content triples, /extract pulls
// readable page content for a batch of URLs (we call it per URL so each
// call fails independently).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ExtractProvider, Extraction, SearchHit, SearchProvider};
use crate::error::ProviderError;

pub struct TavilyClient {
    api_key: String,
    base_url: String,
    http_client: Client,
}

impl TavilyClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent("delve/0.3")
            .build()
            .map_err(ProviderError::Network)?;

        Ok(Self {
            api_key,
            base_url,
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn map_status(status: reqwest::StatusCode, body: String) -> ProviderError {
        match status.as_u16() {
            429 => ProviderError::RateLimited,
            401 | 403 => ProviderError::InvalidApiKey,
            _ => ProviderError::Api(format!("Tavily error {}: {}", status, body)),
        }
    }
}

#[derive(Debug, Serialize)]
struct TavilySearchRequest {
    api_key: String,
    query: String,
    max_results: usize,
    search_depth: String,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    results: Vec<TavilySearchResult>,
}

#[derive(Debug, Deserialize)]
struct TavilySearchResult {
    title: String,
    url: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct TavilyExtractRequest {
    api_key: String,
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TavilyExtractResponse {
    #[serde(default)]
    results: Vec<TavilyExtractResult>,
    #[serde(default)]
    failed_results: Vec<TavilyFailedResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyExtractResult {
    url: String,
    raw_content: String,
}

#[derive(Debug, Deserialize)]
struct TavilyFailedResult {
    url: String,
    #[serde(default)]
    error: String,
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let request = TavilySearchRequest {
            api_key: self.api_key.clone(),
            query: query.to_string(),
            max_results,
            search_depth: "basic".to_string(),
            include_answer: false,
        };

        let response = self
            .http_client
            .post(self.endpoint("search"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "<no body>".into());
            return Err(Self::map_status(status, body));
        }

        let parsed: TavilySearchResponse = response.json().await?;
        debug!(query = %query, results = parsed.results.len(), "tavily search complete");

        Ok(parsed
            .results
            .into_iter()
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: if r.content.is_empty() { None } else { Some(r.content) },
            })
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

#[async_trait]
impl ExtractProvider for TavilyClient {
    async fn extract(&self, url: &str, _prompt: &str) -> Result<Extraction, ProviderError> {
        let request = TavilyExtractRequest {
            api_key: self.api_key.clone(),
            urls: vec![url.to_string()],
        };

        let response = self
            .http_client
            .post(self.endpoint("extract"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "<no body>".into());
            return Err(Self::map_status(status, body));
        }

        let parsed: TavilyExtractResponse = response.json().await?;

        if let Some(result) = parsed.results.into_iter().next() {
            return Ok(Extraction {
                url: result.url,
                content: result.raw_content,
            });
        }

        if let Some(failed) = parsed.failed_results.into_iter().next() {
            warn!(url = %failed.url, "tavily extraction failed");
            return Err(ProviderError::Api(format!(
                "extraction failed for {}: {}",
                failed.url, failed.error
            )));
        }

        Err(ProviderError::Api(format!("no extraction result for {}", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            TavilyClient::map_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::RateLimited
        ));
        assert!(matches!(
            TavilyClient::map_status(reqwest::StatusCode::UNAUTHORIZED, String::new()),
            ProviderError::InvalidApiKey
        ));
        assert!(matches!(
            TavilyClient::map_status(reqwest::StatusCode::BAD_GATEWAY, "oops".into()),
            ProviderError::Api(_)
        ));
    }

    #[test]
    fn test_search_response_parsing() {
        let json = r#"{"results":[{"title":"T","url":"https://example.com","content":"snippet"}]}"#;
        let parsed: TavilySearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].url, "https://example.com");
    }

    #[test]
    fn test_extract_response_parsing_with_failures() {
        let json = r#"{"results":[],"failed_results":[{"url":"https://example.com","error":"403"}]}"#;
        let parsed: TavilyExtractResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.results.is_empty());
        assert_eq!(parsed.failed_results[0].error, "403");
    }
}
