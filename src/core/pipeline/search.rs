//! Search Phase
//!
//! Turns `(name, type, options)` into a ranked, tiered list of candidate
//! URLs plus a short description assembled from the top snippets. Queries
//! are enriched with type-specific terms and the recognized refinement
//! options; results are scored, bucketed into tiers, and truncated to the
//! configured top-k.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::context::{PhaseMetrics, RequestOptions};
use super::error::{ErrorKind, PhaseFailure};
use crate::core::providers::{ProviderError, SearchHit, SearchRequest, Services};
use crate::core::schema::InstitutionType;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Results requested from the provider.
    pub result_count: usize,
    /// Ranked links kept after tiering.
    pub top_k: usize,
    pub timeout: Duration,
    pub language: String,
    pub country: String,
    /// Retries on rate limiting, within the phase timeout.
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_count: 20,
            top_k: 15,
            timeout: Duration::from_secs(10),
            language: "en".to_string(),
            country: "us".to_string(),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Link priority bucket; controls the crawl budget the URL receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkTier {
    High,
    Medium,
    Low,
}

impl LinkTier {
    fn for_score(score: i32) -> Self {
        if score >= 100 {
            LinkTier::High
        } else if score >= 50 {
            LinkTier::Medium
        } else {
            LinkTier::Low
        }
    }
}

/// One scored candidate URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLink {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub domain: String,
    pub score: i32,
    pub tier: LinkTier,
}

/// Search phase output; the cacheable value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub links: Vec<RankedLink>,
    /// Short description assembled from the top snippets.
    pub description: String,
    #[serde(skip)]
    pub metrics: PhaseMetrics,
}

// ============================================================================
// Phase
// ============================================================================

/// Social and encyclopedia hosts penalized during link scoring.
const PENALIZED_HOSTS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "tiktok.com",
    "wikipedia.org",
];

pub struct SearchPhase {
    config: SearchConfig,
}

impl SearchPhase {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Run the provider search and rank the results. Provider failure after
    /// retries is the degraded outcome, reported as a phase failure.
    pub async fn run(
        &self,
        services: &Services,
        name: &str,
        institution_type: InstitutionType,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, PhaseFailure> {
        let query = build_query(name, institution_type, options);
        debug!(%query, "search query built");

        let request = SearchRequest {
            query,
            num_results: self.config.result_count,
            language: self.config.language.clone(),
            country: self.config.country.clone(),
            safe_search: true,
        };

        let mut metrics = PhaseMetrics::default();
        let mut attempt = 0;
        let hits = loop {
            metrics.api_calls += 1;
            let result = tokio::select! {
                result = services.search.search(&request) => result,
                _ = cancel.cancelled() => {
                    return Err(PhaseFailure {
                        kind: ErrorKind::Canceled,
                        metrics,
                    });
                }
            };
            match result {
                Ok(hits) => break hits,
                Err(ProviderError::RateLimited) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(attempt, "search provider rate limited, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.retry_backoff * attempt) => {}
                        _ = cancel.cancelled() => {
                            return Err(PhaseFailure {
                                kind: ErrorKind::Canceled,
                                metrics,
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "search provider unavailable");
                    return Err(PhaseFailure {
                        kind: ErrorKind::SearchProviderUnavailable,
                        metrics,
                    });
                }
            }
        };

        let links = rank_links(&hits, institution_type, options, self.config.top_k);
        let description = hits
            .iter()
            .map(|h| h.snippet.trim())
            .filter(|s| !s.is_empty())
            .take(3)
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(SearchOutcome {
            links,
            description,
            metrics,
        })
    }
}

// ============================================================================
// Query Construction
// ============================================================================

/// Type-specific query enrichment terms.
fn enrichment_terms(ty: InstitutionType) -> &'static str {
    match ty {
        InstitutionType::University => "university college education academic research",
        InstitutionType::Hospital => "hospital medical healthcare clinical services",
        InstitutionType::Bank => "bank banking financial services finance",
        InstitutionType::General => "organization company official",
    }
}

/// Suggested site filter per type.
fn site_filter(ty: InstitutionType) -> Option<&'static str> {
    match ty {
        InstitutionType::University => Some("(site:edu OR site:ac.uk)"),
        InstitutionType::Hospital => Some("(site:org OR site:gov)"),
        InstitutionType::Bank | InstitutionType::General => None,
    }
}

/// Assemble the provider query from the name, enrichment terms, and the
/// recognized refinement options.
pub fn build_query(name: &str, ty: InstitutionType, options: &RequestOptions) -> String {
    let mut parts = vec![name.to_string(), enrichment_terms(ty).to_string()];
    if let Some(location) = &options.location {
        parts.push(location.clone());
    }
    if let Some(keywords) = &options.additional_keywords {
        parts.push(keywords.clone());
    }
    if let Some(hint) = &options.domain_hint {
        parts.push(format!("site:{hint}"));
    }
    if let Some(exclude) = &options.exclude_terms {
        for term in exclude.split_whitespace() {
            parts.push(format!("-{term}"));
        }
    }
    if options.domain_hint.is_none() {
        if let Some(filter) = site_filter(ty) {
            parts.push(filter.to_string());
        }
    }
    parts.join(" ")
}

// ============================================================================
// Link Scoring
// ============================================================================

/// Preferred TLD suffixes per type.
fn preferred_tlds(ty: InstitutionType) -> &'static [&'static str] {
    match ty {
        InstitutionType::University => &[".edu", ".ac.uk", ".edu.au"],
        InstitutionType::Hospital => &[".org", ".gov"],
        InstitutionType::Bank => &[".com"],
        InstitutionType::General => &[".org", ".com"],
    }
}

/// Score one hit against the type and options.
pub fn score_link(hit: &SearchHit, ty: InstitutionType, options: &RequestOptions) -> i32 {
    let mut score = 0;
    let domain = hit.domain.to_lowercase();
    let url = hit.url.to_lowercase();
    let title = hit.title.to_lowercase();

    if preferred_tlds(ty).iter().any(|tld| domain.ends_with(tld)) {
        score += 100;
    }

    let keyword_hits: usize = enrichment_terms(ty)
        .split_whitespace()
        .map(|kw| usize::from(url.contains(kw) || title.contains(kw)))
        .sum();
    score += 15 * keyword_hits.min(3) as i32;

    let path_is_home = url::Url::parse(&hit.url)
        .map(|u| u.path() == "/" || u.path().is_empty())
        .unwrap_or(false);
    if path_is_home || title.contains("official") || url.contains("about") {
        score += 50;
    }

    if PENALIZED_HOSTS.iter().any(|host| domain.ends_with(host)) {
        score -= 20;
    }

    if let Some(hint) = &options.domain_hint {
        let hint = hint.to_lowercase();
        if domain == hint || domain.ends_with(&format!(".{hint}")) {
            score += 20;
        }
    }

    score
}

/// Score, tier, and keep the top-k links in tier-then-score order.
pub fn rank_links(
    hits: &[SearchHit],
    ty: InstitutionType,
    options: &RequestOptions,
    top_k: usize,
) -> Vec<RankedLink> {
    let mut links: Vec<RankedLink> = hits
        .iter()
        .map(|hit| {
            let score = score_link(hit, ty, options);
            RankedLink {
                url: hit.url.clone(),
                title: hit.title.clone(),
                snippet: hit.snippet.clone(),
                domain: hit.domain.clone(),
                score,
                tier: LinkTier::for_score(score),
            }
        })
        .collect();
    links.sort_by(|a, b| a.tier.cmp(&b.tier).then_with(|| b.score.cmp(&a.score)));
    links.truncate(top_k);
    links
}
