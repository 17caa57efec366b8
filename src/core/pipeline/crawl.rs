//! Crawl Phase
//!
//! Fetches prioritized URLs into rich per-page artifacts and scores their
//! media. Each tier gets a depth and page budget modulated by the crawl
//! strategy; URLs are fetched concurrently behind a semaphore and combined
//! in input (tier, score) order regardless of completion order, so the
//! downstream merge is deterministic. Per-URL failures are isolated; the
//! phase fails only when nothing was fetched at all.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::context::{CrawlStrategy, PhaseMetrics, RequestOptions};
use super::error::{ErrorKind, PhaseFailure};
use super::search::{LinkTier, RankedLink};
use crate::core::cache::{CacheProvenance, SimilarityCache};
use crate::core::profile::ScoredImage;
use crate::core::providers::{CrawlArtifact, FetchSpec, ProviderError, Services};
use crate::core::scoring;

// ============================================================================
// Configuration
// ============================================================================

/// Depth and page allocation for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierBudget {
    pub max_depth: u8,
    pub max_pages: usize,
}

/// Per-tier resource table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTable {
    pub high: TierBudget,
    pub medium: TierBudget,
    pub low: TierBudget,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            high: TierBudget {
                max_depth: 3,
                max_pages: 25,
            },
            medium: TierBudget {
                max_depth: 2,
                max_pages: 15,
            },
            low: TierBudget {
                max_depth: 1,
                max_pages: 8,
            },
        }
    }
}

impl TierTable {
    /// Apply the crawl strategy to the default allocation.
    pub fn for_strategy(strategy: CrawlStrategy) -> Self {
        let base = Self::default();
        match strategy {
            CrawlStrategy::PriorityBased => base,
            CrawlStrategy::Equal => {
                let budget = base.medium;
                Self {
                    high: budget,
                    medium: budget,
                    low: budget,
                }
            }
            CrawlStrategy::HighLinks => Self {
                high: TierBudget {
                    max_depth: 2,
                    max_pages: 35,
                },
                medium: TierBudget {
                    max_depth: 1,
                    max_pages: 20,
                },
                low: TierBudget {
                    max_depth: 1,
                    max_pages: 10,
                },
            },
            CrawlStrategy::HighDepth => Self {
                high: TierBudget {
                    max_depth: 4,
                    max_pages: 15,
                },
                medium: TierBudget {
                    max_depth: 3,
                    max_pages: 10,
                },
                low: TierBudget {
                    max_depth: 2,
                    max_pages: 5,
                },
            },
        }
    }

    pub fn budget(&self, tier: LinkTier) -> TierBudget {
        match tier {
            LinkTier::High => self.high,
            LinkTier::Medium => self.medium,
            LinkTier::Low => self.low,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Concurrent URL fetches; the primary backpressure knob.
    pub concurrency: usize,
    pub per_url_timeout: Duration,
    /// Per-page cap on text carried into `total_text`.
    pub per_page_text_cap: usize,
    pub timeout: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            per_url_timeout: Duration::from_secs(15),
            per_page_text_cap: 4000,
            timeout: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// A fetched artifact with its scored media and the tier that earned it.
#[derive(Debug, Clone)]
pub struct ScoredArtifact {
    pub artifact: CrawlArtifact,
    pub scored_images: Vec<ScoredImage>,
    pub tier: LinkTier,
    pub from_cache: bool,
}

/// Crawl phase output.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    /// Successful artifacts in input priority order.
    pub artifacts: Vec<ScoredArtifact>,
    /// Concatenated per-page text, bounded per page.
    pub total_text: String,
    pub pages_attempted: usize,
    pub pages_succeeded: usize,
    pub total_bytes: u64,
    pub cache_hits: usize,
    pub metrics: PhaseMetrics,
}

// ============================================================================
// Phase
// ============================================================================

pub struct CrawlPhase {
    config: CrawlConfig,
}

impl CrawlPhase {
    pub fn new(config: CrawlConfig) -> Self {
        Self { config }
    }

    pub async fn run(
        &self,
        services: &Services,
        institution_name: &str,
        links: &[RankedLink],
        options: &RequestOptions,
        cache: &SimilarityCache<CrawlArtifact>,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome, PhaseFailure> {
        let plan = build_plan(links, options);
        if plan.is_empty() {
            return Err(PhaseFailure::new(ErrorKind::CrawlEmpty));
        }
        let pages_attempted = plan.len();
        debug!(pages = pages_attempted, "crawl plan built");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let fetches = plan.iter().map(|target| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return None,
                };
                if cancel.is_cancelled() {
                    return None;
                }
                self.fetch_one(services, target, options.force_refresh, cache, cancel)
                    .await
            }
        });
        let results: Vec<Option<(CrawlArtifact, bool)>> = join_all(fetches).await;

        if cancel.is_cancelled() {
            return Err(PhaseFailure::new(ErrorKind::Canceled));
        }

        // Combine in plan order: `join_all` preserves input ordering even
        // though completions interleave.
        let mut outcome = CrawlOutcome {
            pages_attempted,
            ..Default::default()
        };
        for (target, result) in plan.iter().zip(results) {
            let Some((artifact, from_cache)) = result else {
                continue;
            };
            outcome.pages_succeeded += 1;
            outcome.total_bytes += artifact.size_bytes;
            if from_cache {
                outcome.cache_hits += 1;
            } else {
                outcome.metrics.api_calls += 1;
            }
            append_page_text(
                &mut outcome.total_text,
                &artifact,
                self.config.per_page_text_cap,
            );
            let scored_images = artifact
                .images
                .iter()
                .map(|image| scoring::score_image(image.clone(), institution_name))
                .collect();
            outcome.artifacts.push(ScoredArtifact {
                artifact,
                scored_images,
                tier: target.tier,
                from_cache,
            });
        }

        if outcome.pages_succeeded == 0 {
            return Err(PhaseFailure {
                kind: ErrorKind::CrawlEmpty,
                metrics: outcome.metrics,
            });
        }
        Ok(outcome)
    }

    /// Fetch one URL through the per-URL cache. Returns `None` on failure;
    /// failures here never fail the phase.
    async fn fetch_one(
        &self,
        services: &Services,
        target: &FetchTarget,
        force_refresh: bool,
        cache: &SimilarityCache<CrawlArtifact>,
        cancel: &CancellationToken,
    ) -> Option<(CrawlArtifact, bool)> {
        let spec = FetchSpec {
            url: target.url.clone(),
            js_enabled: false,
            timeout: self.config.per_url_timeout,
            follow_depth: target.depth,
            max_pages: 1,
        };
        let per_url_timeout = self.config.per_url_timeout;
        let fetch = || {
            let spec = spec.clone();
            async move {
                let fetched = tokio::time::timeout(per_url_timeout, services.crawler.fetch(&spec))
                    .await
                    .map_err(|_| ProviderError::Transport("fetch timed out".to_string()))??;
                if fetched.succeeded() {
                    Ok(fetched)
                } else {
                    // Failed statuses are not worth a day in the cache.
                    Err(ProviderError::Api {
                        status: fetched.status,
                        message: "non-success status".to_string(),
                    })
                }
            }
        };

        let result = tokio::select! {
            result = cache.get_or_compute(&target.canonical, force_refresh, fetch) => result,
            _ = cancel.cancelled() => return None,
        };
        match result {
            Ok((artifact, provenance)) => {
                Some((artifact, provenance != CacheProvenance::Fresh))
            }
            Err(e) => {
                warn!(url = %target.url, error = %e, "page fetch failed");
                None
            }
        }
    }
}

// ============================================================================
// Planning
// ============================================================================

#[derive(Debug, Clone)]
struct FetchTarget {
    url: String,
    canonical: String,
    tier: LinkTier,
    depth: u8,
}

/// Canonical URL for dedup and cache keying: parsed, fragment stripped.
pub fn canonical_url(url: &str) -> Option<String> {
    let mut parsed = url::Url::parse(url).ok()?;
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Apply tier budgets, the global page cap, and canonical dedup to the
/// ranked links, preserving their order.
fn build_plan(links: &[RankedLink], options: &RequestOptions) -> Vec<FetchTarget> {
    let tiers = TierTable::for_strategy(options.strategy);
    let global_cap = options.max_pages.unwrap_or(usize::MAX);
    let mut seen: HashSet<String> = HashSet::new();
    let mut remaining_high = tiers.high.max_pages;
    let mut remaining_medium = tiers.medium.max_pages;
    let mut remaining_low = tiers.low.max_pages;
    let mut plan = Vec::new();

    for link in links {
        if plan.len() >= global_cap {
            break;
        }
        let Some(canonical) = canonical_url(&link.url) else {
            continue;
        };
        if !seen.insert(canonical.clone()) {
            continue;
        }
        let remaining = match link.tier {
            LinkTier::High => &mut remaining_high,
            LinkTier::Medium => &mut remaining_medium,
            LinkTier::Low => &mut remaining_low,
        };
        if *remaining == 0 {
            continue;
        }
        *remaining -= 1;
        plan.push(FetchTarget {
            url: link.url.clone(),
            canonical,
            tier: link.tier,
            depth: tiers.budget(link.tier).max_depth,
        });
    }
    plan
}

/// Append one page's bounded text to the running aggregate.
fn append_page_text(total_text: &mut String, artifact: &CrawlArtifact, cap: usize) {
    let text = &artifact.markdown.primary_content;
    if text.is_empty() {
        return;
    }
    if !total_text.is_empty() {
        total_text.push_str("\n\n");
    }
    total_text.extend(text.chars().take(cap));
}
