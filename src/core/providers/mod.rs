//! External Capability Interfaces
//!
//! The three narrow capabilities the pipeline consumes — web search, page
//! crawling, LLM completion — plus the `Services` bundle that threads them
//! through the pipeline. Construct the bundle once at startup; there is no
//! process-wide provider state.

pub mod crawler;
pub mod llm;
pub mod search;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::profile::ImageRecord;

pub use crawler::HttpCrawler;
pub use llm::{pricing_for, ModelPricing, OpenAiCompatClient};
pub use search::SerperSearchProvider;

// ============================================================================
// Errors
// ============================================================================

/// Provider transport and protocol failures.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited")]
    RateLimited,

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

// ============================================================================
// Search Capability
// ============================================================================

/// Parameters for one provider search call.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub num_results: usize,
    pub language: String,
    pub country: String,
    pub safe_search: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            num_results: 20,
            language: "en".to_string(),
            country: "us".to_string(),
            safe_search: true,
        }
    }
}

/// One raw search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub domain: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> ProviderResult<Vec<SearchHit>>;
}

// ============================================================================
// Crawler Capability
// ============================================================================

/// Parameters for one engine fetch.
#[derive(Debug, Clone)]
pub struct FetchSpec {
    pub url: String,
    pub js_enabled: bool,
    pub timeout: Duration,
    pub follow_depth: u8,
    pub max_pages: usize,
}

impl FetchSpec {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            js_enabled: false,
            timeout: Duration::from_secs(15),
            follow_depth: 1,
            max_pages: 1,
        }
    }
}

/// Markdown rendering of a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkdownContent {
    pub title: String,
    pub primary_content: String,
}

/// Everything the engine captured for one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlArtifact {
    pub url: String,
    pub status: u16,
    pub raw_html: String,
    pub cleaned_html: String,
    pub markdown: MarkdownContent,
    /// JSON-LD / microdata blocks.
    pub structured_data: Vec<serde_json::Value>,
    pub images: Vec<ImageRecord>,
    pub videos: Vec<String>,
    pub audio: Vec<String>,
    pub internal_links: Vec<String>,
    pub external_links: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub fetched_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl CrawlArtifact {
    pub fn empty(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 0,
            raw_html: String::new(),
            cleaned_html: String::new(),
            markdown: MarkdownContent::default(),
            structured_data: Vec::new(),
            images: Vec::new(),
            videos: Vec::new(),
            audio: Vec::new(),
            internal_links: Vec::new(),
            external_links: Vec::new(),
            metadata: BTreeMap::new(),
            fetched_at: Utc::now(),
            size_bytes: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrawlerEngine: Send + Sync {
    async fn fetch(&self, spec: &FetchSpec) -> ProviderResult<CrawlArtifact>;
}

// ============================================================================
// LLM Capability
// ============================================================================

/// Parameters for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Completion result with usage accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<Completion>;
}

// ============================================================================
// Services Bundle
// ============================================================================

/// Capability bundle threaded through the pipeline.
#[derive(Clone)]
pub struct Services {
    pub search: Arc<dyn SearchProvider>,
    pub crawler: Arc<dyn CrawlerEngine>,
    pub llm: Arc<dyn LlmClient>,
}

impl Services {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        crawler: Arc<dyn CrawlerEngine>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            search,
            crawler,
            llm,
        }
    }
}
