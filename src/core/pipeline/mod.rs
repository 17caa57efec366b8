//! Pipeline Orchestration
//!
//! Drives search → crawl → extract for one request: opens a benchmark span
//! per phase, consults the phase-appropriate cache, enforces per-phase
//! timeouts, and routes failures. Non-fatal phase failures degrade the
//! result; only schema mismatches and cancellation abort the request.

pub mod content;
pub mod context;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod search;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::core::benchmark::{BenchmarkCollector, BenchmarkSample, PhaseCategory};
use crate::core::cache::{
    AbbreviationTable, CacheProvenance, DiskStore, NormalizedKey, SimilarityCache,
};
use crate::core::profile::{MediaBundle, ProfileRecord};
use crate::core::providers::{CrawlArtifact, Services};
use crate::core::schema::InstitutionType;
use crate::core::scoring::{self, DataSignals, QualityScore};

pub use content::{prepare, ContentSource, PreparedContent};
pub use context::{CrawlStrategy, PhaseMetrics, ProfileRequest, ProfilingContext, RequestOptions};
pub use crawl::{CrawlConfig, CrawlOutcome, CrawlPhase, ScoredArtifact, TierBudget, TierTable};
pub use error::{ErrorKind, PhaseFailure, PipelineError, PipelineResult};
pub use extract::{ExtractConfig, ExtractOutcome, ExtractPhase};
pub use search::{LinkTier, RankedLink, SearchConfig, SearchOutcome, SearchPhase};

/// Requests between periodic cache sweeps.
const SWEEP_INTERVAL: u64 = 50;

// ============================================================================
// Caches
// ============================================================================

/// Per-cache TTLs.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub search: Duration,
    pub crawl: Duration,
    pub extract: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(7 * 86_400),
            crawl: Duration::from_secs(86_400),
            extract: Duration::from_secs(7 * 86_400),
        }
    }
}

/// The three pipeline caches.
pub struct CacheSet {
    pub search: SimilarityCache<SearchOutcome>,
    pub crawl: SimilarityCache<CrawlArtifact>,
    pub extract: SimilarityCache<ProfileRecord>,
}

impl CacheSet {
    pub fn in_memory(ttls: CacheTtls) -> Self {
        Self {
            search: SimilarityCache::new("search", ttls.search, None),
            crawl: SimilarityCache::exact("crawl", ttls.crawl, None),
            extract: SimilarityCache::new("extract", ttls.extract, None),
        }
    }

    /// File-backed caches under `<base_dir>/cache/{search,crawl,extract}/`.
    pub fn persistent(base_dir: &Path, ttls: CacheTtls) -> std::io::Result<Self> {
        let cache_dir = base_dir.join("cache");
        Ok(Self {
            search: SimilarityCache::new(
                "search",
                ttls.search,
                Some(DiskStore::new(cache_dir.join("search"))?),
            ),
            crawl: SimilarityCache::exact(
                "crawl",
                ttls.crawl,
                Some(DiskStore::new(cache_dir.join("crawl"))?),
            ),
            extract: SimilarityCache::new(
                "extract",
                ttls.extract,
                Some(DiskStore::new(cache_dir.join("extract"))?),
            ),
        })
    }

    pub async fn sweep_all(&self) {
        self.search.sweep().await;
        self.crawl.sweep().await;
        self.extract.sweep().await;
    }
}

// ============================================================================
// Report
// ============================================================================

/// Final result: extracted record, crawl-derived media, quality score, and
/// the request's benchmark trace.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub institution_name: String,
    pub canonical_key: String,
    pub institution_type: InstitutionType,
    pub record: ProfileRecord,
    pub media: MediaBundle,
    pub quality: QualityScore,
    /// True when any phase reported a non-fatal failure.
    pub degraded: bool,
    pub error_kinds: Vec<ErrorKind>,
    /// URLs that contributed content.
    pub sources: Vec<String>,
    /// Extractor response keys dropped as out-of-schema.
    pub dropped_keys: Vec<String>,
    pub benchmark: Vec<BenchmarkSample>,
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct PipelineBuilder {
    services: Services,
    caches: Option<CacheSet>,
    abbreviations: AbbreviationTable,
    benchmark: Option<Arc<BenchmarkCollector>>,
    search: SearchConfig,
    crawl: CrawlConfig,
    extract: ExtractConfig,
}

impl PipelineBuilder {
    pub fn caches(mut self, caches: CacheSet) -> Self {
        self.caches = Some(caches);
        self
    }

    pub fn abbreviations(mut self, abbreviations: AbbreviationTable) -> Self {
        self.abbreviations = abbreviations;
        self
    }

    pub fn benchmark(mut self, benchmark: Arc<BenchmarkCollector>) -> Self {
        self.benchmark = Some(benchmark);
        self
    }

    pub fn search_config(mut self, config: SearchConfig) -> Self {
        self.search = config;
        self
    }

    pub fn crawl_config(mut self, config: CrawlConfig) -> Self {
        self.crawl = config;
        self
    }

    pub fn extract_config(mut self, config: ExtractConfig) -> Self {
        self.extract = config;
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            services: self.services,
            caches: self
                .caches
                .unwrap_or_else(|| CacheSet::in_memory(CacheTtls::default())),
            abbreviations: self.abbreviations,
            benchmark: self
                .benchmark
                .unwrap_or_else(|| Arc::new(BenchmarkCollector::ephemeral())),
            search_timeout: self.search.timeout,
            crawl_timeout: self.crawl.timeout,
            extract_timeout: self.extract.timeout,
            search_phase: SearchPhase::new(self.search),
            crawl_phase: CrawlPhase::new(self.crawl),
            extract_phase: ExtractPhase::new(self.extract),
            profiles_run: AtomicU64::new(0),
        }
    }
}

/// The profiling pipeline. One instance serves many concurrent requests.
pub struct Pipeline {
    services: Services,
    caches: CacheSet,
    abbreviations: AbbreviationTable,
    benchmark: Arc<BenchmarkCollector>,
    search_phase: SearchPhase,
    crawl_phase: CrawlPhase,
    extract_phase: ExtractPhase,
    search_timeout: Duration,
    crawl_timeout: Duration,
    extract_timeout: Duration,
    profiles_run: AtomicU64,
}

impl Pipeline {
    pub fn builder(services: Services) -> PipelineBuilder {
        PipelineBuilder {
            services,
            caches: None,
            abbreviations: AbbreviationTable::empty(),
            benchmark: None,
            search: SearchConfig::default(),
            crawl: CrawlConfig::default(),
            extract: ExtractConfig::default(),
        }
    }

    pub fn benchmark_collector(&self) -> &Arc<BenchmarkCollector> {
        &self.benchmark
    }

    /// Sweep expired cache entries; run at startup and then periodically.
    pub async fn sweep_caches(&self) {
        self.caches.sweep_all().await;
    }

    /// Hit-rate snapshots of the three pipeline caches.
    pub async fn cache_stats(&self) -> Vec<(&'static str, crate::core::cache::CacheStats)> {
        vec![
            ("search", self.caches.search.stats().await),
            ("crawl", self.caches.crawl.stats().await),
            ("extract", self.caches.extract.stats().await),
        ]
    }

    pub async fn profile(&self, request: ProfileRequest) -> PipelineResult<ProfileReport> {
        self.profile_with_cancel(request, CancellationToken::new())
            .await
    }

    #[instrument(skip_all, fields(institution = %request.institution_name))]
    pub async fn profile_with_cancel(
        &self,
        request: ProfileRequest,
        cancel: CancellationToken,
    ) -> PipelineResult<ProfileReport> {
        // Sampled across the whole request, sweep included, so a corrupt
        // entry quarantined anywhere along the way is reported here.
        let corrupt_before = self.corrupt_total();
        if self.profiles_run.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == 0 {
            self.sweep_caches().await;
        }

        let institution_type = request
            .options
            .institution_type
            .unwrap_or_else(|| InstitutionType::infer(&request.institution_name));
        let key = NormalizedKey::new(
            &request.institution_name,
            request.options.institution_type,
            request.options.fingerprint(),
            &self.abbreviations,
        );
        info!(key = %key, ty = %institution_type, "profiling request accepted");
        let mut ctx = ProfilingContext::new(request, key, institution_type, cancel);

        let mut pipeline_span = self.benchmark.open_span(PhaseCategory::Pipeline);

        self.run_search(&mut ctx).await?;
        self.run_crawl(&mut ctx).await?;

        let prepared = content::prepare(
            ctx.crawl.as_ref(),
            ctx.search.as_ref(),
            ctx.request.options.direct_text.as_deref(),
        );

        if !ctx.request.options.skip_extraction {
            self.run_extract(&mut ctx, &prepared).await?;
        }

        if self.corrupt_total() > corrupt_before {
            ctx.push_error(ErrorKind::CacheCorrupt);
        }

        // Assemble the report.
        let extract_outcome = ctx.extract.take();
        let dropped_keys = extract_outcome
            .as_ref()
            .map(|o| o.dropped_keys.clone())
            .unwrap_or_default();
        let mut record = extract_outcome.map(|o| o.record).unwrap_or_default();
        extract::apply_crawl_basics(
            &mut record,
            &ctx.request.institution_name,
            ctx.institution_type,
            ctx.crawl.as_ref(),
        );
        let media = ctx
            .crawl
            .as_ref()
            .map(extract::merge_media)
            .unwrap_or_default();

        let signals = self.build_signals(&ctx);
        let quality = scoring::score(&record, ctx.institution_type, &media, &signals);

        // Roll phase totals into the whole-request span.
        for sample in &ctx.samples {
            pipeline_span.record_cost(sample.cost_usd);
            pipeline_span.record_tokens(sample.input_tokens, sample.output_tokens);
        }
        pipeline_span.record_completeness(quality.base * 100.0);
        let success = ctx.error_kinds.is_empty();
        let sample =
            self.benchmark
                .close_span(pipeline_span, success, ctx.error_kinds.first().copied());
        ctx.samples.push(sample);

        let sources = ctx
            .crawl
            .as_ref()
            .map(|c| c.artifacts.iter().map(|a| a.artifact.url.clone()).collect())
            .unwrap_or_default();

        Ok(ProfileReport {
            institution_name: ctx.request.institution_name,
            canonical_key: ctx.key.cache_key(),
            institution_type: ctx.institution_type,
            record,
            media,
            quality,
            degraded: !ctx.error_kinds.is_empty(),
            error_kinds: ctx.error_kinds,
            sources,
            dropped_keys,
            benchmark: ctx.samples,
        })
    }

    fn corrupt_total(&self) -> u64 {
        self.caches.search.corrupt_count()
            + self.caches.crawl.corrupt_count()
            + self.caches.extract.corrupt_count()
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    async fn run_search(&self, ctx: &mut ProfilingContext) -> PipelineResult<()> {
        let mut span = self.benchmark.open_span(PhaseCategory::Search);
        let cache_key = ctx.key.cache_key();
        let force_refresh = ctx.request.options.force_refresh;
        let name = ctx.request.institution_name.clone();
        let institution_type = ctx.institution_type;
        let options = ctx.request.options.clone();
        let cancel = ctx.cancel.clone();
        let phase = &self.search_phase;
        let services = &self.services;

        let result = tokio::time::timeout(
            self.search_timeout,
            self.caches.search.get_or_compute(&cache_key, force_refresh, || {
                let name = name.clone();
                let options = options.clone();
                let cancel = cancel.clone();
                async move {
                    phase
                        .run(services, &name, institution_type, &options, &cancel)
                        .await
                }
            }),
        )
        .await;

        match result {
            Ok(Ok((outcome, provenance))) => {
                if provenance != CacheProvenance::Fresh {
                    span.record_cache_hit(provenance);
                }
                outcome.metrics.merge_into(&mut span);
                ctx.samples.push(self.benchmark.close_span(span, true, None));
                ctx.search = Some(outcome);
            }
            Ok(Err(failure)) => {
                if failure.kind == ErrorKind::Canceled {
                    let _ = self
                        .benchmark
                        .close_span(span, false, Some(ErrorKind::Canceled));
                    return Err(PipelineError::Canceled);
                }
                failure.metrics.merge_into(&mut span);
                ctx.samples
                    .push(self.benchmark.close_span(span, false, Some(failure.kind)));
                ctx.push_error(ErrorKind::SearchProviderUnavailable);
                ctx.search = Some(SearchOutcome::default());
            }
            Err(_) => {
                ctx.samples.push(self.benchmark.close_span(
                    span,
                    false,
                    Some(ErrorKind::PhaseTimeout),
                ));
                ctx.push_error(ErrorKind::SearchProviderUnavailable);
                ctx.search = Some(SearchOutcome::default());
            }
        }

        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Canceled);
        }
        Ok(())
    }

    async fn run_crawl(&self, ctx: &mut ProfilingContext) -> PipelineResult<()> {
        let mut span = self.benchmark.open_span(PhaseCategory::Crawl);
        let links = ctx
            .search
            .as_ref()
            .map(|s| s.links.clone())
            .unwrap_or_default();

        if links.is_empty() {
            // Nothing to crawl, usually because search degraded.
            ctx.samples.push(self.benchmark.close_span(
                span,
                false,
                Some(ErrorKind::CrawlEmpty),
            ));
            ctx.push_error(ErrorKind::CrawlEmpty);
            return Ok(());
        }

        let result = tokio::time::timeout(
            self.crawl_timeout,
            self.crawl_phase.run(
                &self.services,
                &ctx.request.institution_name,
                &links,
                &ctx.request.options,
                &self.caches.crawl,
                &ctx.cancel,
            ),
        )
        .await;

        match result {
            Ok(Ok(outcome)) => {
                outcome.metrics.merge_into(&mut span);
                if outcome.pages_succeeded > 0 && outcome.cache_hits == outcome.pages_succeeded {
                    span.record_cache_hit(CacheProvenance::DirectHit);
                }
                ctx.samples.push(self.benchmark.close_span(span, true, None));
                ctx.crawl = Some(outcome);
            }
            Ok(Err(failure)) => {
                if failure.kind == ErrorKind::Canceled {
                    let _ = self
                        .benchmark
                        .close_span(span, false, Some(ErrorKind::Canceled));
                    return Err(PipelineError::Canceled);
                }
                failure.metrics.merge_into(&mut span);
                ctx.samples
                    .push(self.benchmark.close_span(span, false, Some(failure.kind)));
                ctx.push_error(ErrorKind::CrawlEmpty);
            }
            Err(_) => {
                ctx.samples.push(self.benchmark.close_span(
                    span,
                    false,
                    Some(ErrorKind::PhaseTimeout),
                ));
                ctx.push_error(ErrorKind::CrawlEmpty);
            }
        }

        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Canceled);
        }
        Ok(())
    }

    async fn run_extract(
        &self,
        ctx: &mut ProfilingContext,
        prepared: &PreparedContent,
    ) -> PipelineResult<()> {
        let mut span = self.benchmark.open_span(PhaseCategory::Extract);
        let cache_key = self.extract_phase.cache_key(&ctx.key, prepared);
        let force_refresh = ctx.request.options.force_refresh;
        let name = ctx.request.institution_name.clone();
        let institution_type = ctx.institution_type;
        let cancel = ctx.cancel.clone();
        let phase = &self.extract_phase;
        let services = &self.services;

        // The cache stores the record alone; the side slot carries the fresh
        // run's metrics and dropped keys past the cache boundary.
        let side: StdMutex<Option<ExtractOutcome>> = StdMutex::new(None);

        let result = tokio::time::timeout(
            self.extract_timeout,
            self.caches.extract.get_or_compute(&cache_key, force_refresh, || {
                let name = name.clone();
                let cancel = cancel.clone();
                let side = &side;
                async move {
                    let outcome = phase
                        .run(services, &name, institution_type, prepared, &cancel)
                        .await?;
                    let record = outcome.record.clone();
                    if let Ok(mut slot) = side.lock() {
                        *slot = Some(outcome);
                    }
                    Ok::<ProfileRecord, PhaseFailure>(record)
                }
            }),
        )
        .await;

        match result {
            Ok(Ok((record, provenance))) => {
                if provenance != CacheProvenance::Fresh {
                    span.record_cache_hit(provenance);
                }
                let fresh = side.lock().ok().and_then(|mut slot| slot.take());
                let outcome = match fresh {
                    Some(outcome) => {
                        outcome.metrics.merge_into(&mut span);
                        outcome
                    }
                    None => ExtractOutcome {
                        record,
                        ..Default::default()
                    },
                };
                ctx.samples.push(self.benchmark.close_span(span, true, None));
                ctx.extract = Some(outcome);
            }
            Ok(Err(failure)) => {
                if failure.kind == ErrorKind::Canceled {
                    let _ = self
                        .benchmark
                        .close_span(span, false, Some(ErrorKind::Canceled));
                    return Err(PipelineError::Canceled);
                }
                failure.metrics.merge_into(&mut span);
                ctx.samples
                    .push(self.benchmark.close_span(span, false, Some(failure.kind)));
                ctx.push_error(ErrorKind::ExtractFailed);
            }
            Err(_) => {
                ctx.samples.push(self.benchmark.close_span(
                    span,
                    false,
                    Some(ErrorKind::PhaseTimeout),
                ));
                ctx.push_error(ErrorKind::ExtractFailed);
            }
        }

        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Canceled);
        }
        Ok(())
    }

    fn build_signals(&self, ctx: &ProfilingContext) -> DataSignals {
        let (crawl_attempted, crawl_succeeded, total_bytes, crawl_cache_hits) = ctx
            .crawl
            .as_ref()
            .map(|c| (c.pages_attempted, c.pages_succeeded, c.total_bytes, c.cache_hits))
            .unwrap_or_default();

        let keyed_lookups = ctx
            .samples
            .iter()
            .filter(|s| {
                matches!(
                    s.category,
                    PhaseCategory::Search | PhaseCategory::Extract
                )
            })
            .count();
        let keyed_hits = ctx
            .samples
            .iter()
            .filter(|s| {
                matches!(
                    s.cache_hit,
                    Some(CacheProvenance::DirectHit) | Some(CacheProvenance::SimilarityHit)
                ) && s.category != PhaseCategory::Crawl
            })
            .count();

        let search_ok = !ctx
            .error_kinds
            .contains(&ErrorKind::SearchProviderUnavailable);
        let crawl_ok = !ctx.error_kinds.contains(&ErrorKind::CrawlEmpty);
        let extract_ok =
            ctx.extract.is_some() && !ctx.error_kinds.contains(&ErrorKind::ExtractFailed);
        let phases_ok = u8::from(search_ok) + u8::from(crawl_ok) + u8::from(extract_ok);

        DataSignals {
            sources: crawl_succeeded,
            crawl_attempted,
            crawl_succeeded,
            total_bytes,
            cache_hits: keyed_hits + crawl_cache_hits,
            cache_lookups: keyed_lookups + crawl_attempted,
            phases_ok,
        }
    }
}
