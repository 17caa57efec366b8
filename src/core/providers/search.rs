//! Serper-Style Search Provider
//!
//! JSON search API client: POST the query, read the organic result list.
//! HTTP 429 maps to the rate-limited error so the search phase can retry
//! with backoff inside its timeout budget.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ProviderError, ProviderResult, SearchHit, SearchProvider, SearchRequest};

const DEFAULT_ENDPOINT: &str = "https://google.serper.dev/search";

/// Serper-compatible search API client.
pub struct SerperSearchProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

impl SerperSearchProvider {
    pub fn new(api_key: String) -> ProviderResult<Self> {
        Self::with_endpoint(api_key, DEFAULT_ENDPOINT.to_string())
    }

    /// Construct against a custom endpoint (self-hosted gateway, tests).
    pub fn with_endpoint(api_key: String, endpoint: String) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.trim().to_string(),
        })
    }
}

#[async_trait]
impl SearchProvider for SerperSearchProvider {
    async fn search(&self, request: &SearchRequest) -> ProviderResult<Vec<SearchHit>> {
        let body = serde_json::json!({
            "q": request.query,
            "num": request.num_results,
            "hl": request.language,
            "gl": request.country,
            "safe": if request.safe_search { "active" } else { "off" },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let hits: Vec<SearchHit> = parsed
            .organic
            .into_iter()
            .filter(|o| !o.link.is_empty())
            .map(|o| {
                let domain = url::Url::parse(&o.link)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_default();
                SearchHit {
                    url: o.link,
                    title: o.title,
                    snippet: o.snippet,
                    domain,
                }
            })
            .collect();
        debug!(query = %request.query, hits = hits.len(), "search provider returned");
        Ok(hits)
    }
}
