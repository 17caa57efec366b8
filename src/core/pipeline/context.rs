//! Requests, Options, and the Per-Request Context
//!
//! A `ProfileRequest` is what callers submit; the `ProfilingContext` is the
//! mutable record the orchestrator threads through the phases, owning every
//! phase output until the final report is assembled.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use super::crawl::CrawlOutcome;
use super::error::ErrorKind;
use super::extract::ExtractOutcome;
use super::search::SearchOutcome;
use crate::core::benchmark::BenchmarkSample;
use crate::core::cache::NormalizedKey;
use crate::core::schema::InstitutionType;

// ============================================================================
// Options
// ============================================================================

/// Crawl-tier resource strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStrategy {
    Equal,
    PriorityBased,
    HighLinks,
    HighDepth,
}

impl Default for CrawlStrategy {
    fn default() -> Self {
        CrawlStrategy::PriorityBased
    }
}

impl std::str::FromStr for CrawlStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equal" => Ok(CrawlStrategy::Equal),
            "priority_based" | "priority" => Ok(CrawlStrategy::PriorityBased),
            "high_links" => Ok(CrawlStrategy::HighLinks),
            "high_depth" => Ok(CrawlStrategy::HighDepth),
            other => Err(format!("unknown crawl strategy: {other}")),
        }
    }
}

/// Recognized request options. All optional; defaults leave behavior
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    /// Overrides type inference.
    pub institution_type: Option<InstitutionType>,
    /// Free-text location constraint appended to the search query.
    pub location: Option<String>,
    pub additional_keywords: Option<String>,
    /// Preferred domain; becomes a `site:` operator and a link-score boost.
    pub domain_hint: Option<String>,
    /// Space-separated; each term becomes a negative search term.
    pub exclude_terms: Option<String>,
    /// Bypass cache reads for this request; writes still populate caches.
    pub force_refresh: bool,
    /// Stop after crawl and return the partial result.
    pub skip_extraction: bool,
    pub strategy: CrawlStrategy,
    /// Global cap on total pages crawled.
    pub max_pages: Option<usize>,
    /// Caller-supplied text used when search and crawl produce nothing.
    pub direct_text: Option<String>,
}

impl RequestOptions {
    /// Fingerprint of the search-refinement options, part of the normalized
    /// key so differently-refined requests cache separately. Requests with
    /// no refinements share the empty fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut parts = Vec::new();
        if let Some(location) = &self.location {
            parts.push(format!("location={location}"));
        }
        if let Some(keywords) = &self.additional_keywords {
            parts.push(format!("keywords={keywords}"));
        }
        if let Some(hint) = &self.domain_hint {
            parts.push(format!("domain={hint}"));
        }
        if let Some(exclude) = &self.exclude_terms {
            parts.push(format!("exclude={exclude}"));
        }
        if parts.is_empty() {
            return String::new();
        }
        let digest = Sha256::digest(parts.join("&").as_bytes());
        hex::encode(digest)[..12].to_string()
    }
}

/// One profiling request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileRequest {
    pub institution_name: String,
    #[serde(default)]
    pub options: RequestOptions,
}

impl ProfileRequest {
    pub fn new(institution_name: impl Into<String>) -> Self {
        Self {
            institution_name: institution_name.into(),
            options: RequestOptions::default(),
        }
    }

    pub fn with_type(mut self, ty: InstitutionType) -> Self {
        self.options.institution_type = Some(ty);
        self
    }
}

// ============================================================================
// Phase Metrics
// ============================================================================

/// Provider-call accounting a phase hands back for its benchmark span.
/// Excluded from cached phase outputs: replayed values cost nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseMetrics {
    pub api_calls: u32,
    pub cost_usd: f64,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl PhaseMetrics {
    pub fn merge_into(&self, span: &mut crate::core::benchmark::SpanHandle) {
        for _ in 0..self.api_calls {
            span.record_api_call();
        }
        span.record_tokens(self.input_tokens, self.output_tokens);
        span.record_cost(self.cost_usd);
    }
}

// ============================================================================
// Context
// ============================================================================

/// Mutable per-request state. Owns all phase outputs until the report is
/// assembled; the orchestrator is the only writer.
pub struct ProfilingContext {
    pub request: ProfileRequest,
    pub key: NormalizedKey,
    pub institution_type: InstitutionType,
    pub cancel: CancellationToken,
    pub search: Option<SearchOutcome>,
    pub crawl: Option<CrawlOutcome>,
    pub extract: Option<ExtractOutcome>,
    pub error_kinds: Vec<ErrorKind>,
    pub samples: Vec<BenchmarkSample>,
}

impl ProfilingContext {
    pub fn new(
        request: ProfileRequest,
        key: NormalizedKey,
        institution_type: InstitutionType,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request,
            key,
            institution_type,
            cancel,
            search: None,
            crawl: None,
            extract: None,
            error_kinds: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn push_error(&mut self, kind: ErrorKind) {
        if !self.error_kinds.contains(&kind) {
            self.error_kinds.push(kind);
        }
    }

    pub fn degraded(&self) -> bool {
        !self.error_kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_empty_without_refinements() {
        let options = RequestOptions::default();
        assert_eq!(options.fingerprint(), "");

        // Non-refinement options do not affect the fingerprint.
        let options = RequestOptions {
            force_refresh: true,
            skip_extraction: true,
            max_pages: Some(3),
            ..Default::default()
        };
        assert_eq!(options.fingerprint(), "");
    }

    #[test]
    fn test_fingerprint_stable_and_distinct() {
        let a = RequestOptions {
            location: Some("Boston".to_string()),
            ..Default::default()
        };
        let b = RequestOptions {
            location: Some("Cambridge".to_string()),
            ..Default::default()
        };
        assert_eq!(a.fingerprint(), a.fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
    }

    #[test]
    fn test_strategy_parse() {
        use std::str::FromStr;
        assert_eq!(CrawlStrategy::from_str("equal").unwrap(), CrawlStrategy::Equal);
        assert_eq!(
            CrawlStrategy::from_str("priority_based").unwrap(),
            CrawlStrategy::PriorityBased
        );
        assert_eq!(CrawlStrategy::from_str("HIGH_LINKS").unwrap(), CrawlStrategy::HighLinks);
        assert!(CrawlStrategy::from_str("maximal").is_err());
    }

    #[test]
    fn test_push_error_dedupes() {
        let request = ProfileRequest::new("X");
        let key = NormalizedKey {
            canonical_name: "x".to_string(),
            type_tag: None,
            option_fingerprint: String::new(),
        };
        let mut ctx = ProfilingContext::new(
            request,
            key,
            InstitutionType::General,
            CancellationToken::new(),
        );
        ctx.push_error(ErrorKind::CrawlEmpty);
        ctx.push_error(ErrorKind::CrawlEmpty);
        assert_eq!(ctx.error_kinds, vec![ErrorKind::CrawlEmpty]);
        assert!(ctx.degraded());
    }
}
