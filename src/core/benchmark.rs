//! Benchmark Collection
//!
//! Thread-safe append-only journal of per-phase samples plus in-memory
//! aggregates. Each pipeline phase runs inside a span; closing the span
//! flushes one JSON line to the session journal and folds the sample into
//! the aggregate counters. One journal file per session, named by start
//! timestamp; a cross-session aggregate snapshot is rewritten as samples
//! arrive.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::cache::CacheProvenance;
use super::pipeline::error::ErrorKind;

// ============================================================================
// Samples
// ============================================================================

/// Benchmark category: the three phases plus the whole-request span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseCategory {
    Search,
    Crawl,
    Extract,
    Pipeline,
}

impl PhaseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseCategory::Search => "search",
            PhaseCategory::Crawl => "crawl",
            PhaseCategory::Extract => "extract",
            PhaseCategory::Pipeline => "pipeline",
        }
    }
}

/// One closed span, as journaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSample {
    pub session_id: String,
    pub category: PhaseCategory,
    pub phase_ms: u64,
    pub cost_usd: f64,
    pub api_calls: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<CacheProvenance>,
    pub success: bool,
    /// Fraction of schema fields present at span close, in percent.
    pub completeness_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub closed_at: DateTime<Utc>,
}

/// Open span accumulator. Metrics recorded here land in the sample when the
/// collector closes the span.
#[derive(Debug)]
pub struct SpanHandle {
    category: PhaseCategory,
    started: Instant,
    cost_usd: f64,
    api_calls: u32,
    input_tokens: u32,
    output_tokens: u32,
    cache_hit: Option<CacheProvenance>,
    completeness_pct: f64,
}

impl SpanHandle {
    pub fn category(&self) -> PhaseCategory {
        self.category
    }

    pub fn record_cost(&mut self, usd: f64) {
        self.cost_usd += usd;
    }

    pub fn record_api_call(&mut self) {
        self.api_calls += 1;
    }

    pub fn record_tokens(&mut self, input: u32, output: u32) {
        self.input_tokens += input;
        self.output_tokens += output;
    }

    pub fn record_cache_hit(&mut self, kind: CacheProvenance) {
        self.cache_hit = Some(kind);
    }

    pub fn record_completeness(&mut self, pct: f64) {
        self.completeness_pct = pct.clamp(0.0, 100.0);
    }
}

// ============================================================================
// Aggregates
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryAggregate {
    pub count: u64,
    pub success_count: u64,
    pub total_ms: u64,
    pub total_cost_usd: f64,
}

impl CategoryAggregate {
    pub fn success_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.count as f64
        }
    }
}

/// Cross-session aggregate counters; also the aggregate.json shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Aggregates {
    pub total_samples: u64,
    pub total_cost_usd: f64,
    pub by_category: BTreeMap<String, CategoryAggregate>,
    /// Counts of cache hit kinds observed on spans.
    pub cache_hit_kinds: BTreeMap<String, u64>,
}

impl Aggregates {
    fn fold(&mut self, sample: &BenchmarkSample) {
        self.total_samples += 1;
        self.total_cost_usd += sample.cost_usd;
        let entry = self
            .by_category
            .entry(sample.category.as_str().to_string())
            .or_default();
        entry.count += 1;
        if sample.success {
            entry.success_count += 1;
        }
        entry.total_ms += sample.phase_ms;
        entry.total_cost_usd += sample.cost_usd;
        if let Some(kind) = sample.cache_hit {
            let name = match kind {
                CacheProvenance::DirectHit => "direct_hit",
                CacheProvenance::SimilarityHit => "similarity_hit",
                CacheProvenance::Fresh => "fresh",
                CacheProvenance::StaleRefresh => "stale_refresh",
            };
            *self.cache_hit_kinds.entry(name.to_string()).or_insert(0) += 1;
        }
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Session-scoped benchmark collector.
pub struct BenchmarkCollector {
    session_id: String,
    /// Journal file handle; the append is the only critical section.
    journal: Option<Mutex<File>>,
    aggregate_path: Option<PathBuf>,
    aggregates: Mutex<Aggregates>,
}

impl BenchmarkCollector {
    /// Collector persisting under `<base_dir>/benchmarks/`. Existing
    /// aggregates are carried forward.
    pub fn new(base_dir: &Path) -> std::io::Result<Self> {
        let dir = base_dir.join("benchmarks");
        fs::create_dir_all(&dir)?;
        let session_file = dir.join(format!(
            "session_{}.jsonl",
            Utc::now().format("%Y-%m-%dT%H-%M-%SZ")
        ));
        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(session_file)?;
        let aggregate_path = dir.join("aggregate.json");
        let aggregates = match fs::read_to_string(&aggregate_path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Aggregates::default(),
        };
        Ok(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            journal: Some(Mutex::new(journal)),
            aggregate_path: Some(aggregate_path),
            aggregates: Mutex::new(aggregates),
        })
    }

    /// In-memory collector with no persistence.
    pub fn ephemeral() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            journal: None,
            aggregate_path: None,
            aggregates: Mutex::new(Aggregates::default()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn open_span(&self, category: PhaseCategory) -> SpanHandle {
        SpanHandle {
            category,
            started: Instant::now(),
            cost_usd: 0.0,
            api_calls: 0,
            input_tokens: 0,
            output_tokens: 0,
            cache_hit: None,
            completeness_pct: 0.0,
        }
    }

    /// Close a span: flush the sample to the journal, fold it into the
    /// aggregates, and hand it back for the request report.
    pub fn close_span(
        &self,
        handle: SpanHandle,
        success: bool,
        error_kind: Option<ErrorKind>,
    ) -> BenchmarkSample {
        let sample = BenchmarkSample {
            session_id: self.session_id.clone(),
            category: handle.category,
            phase_ms: handle.started.elapsed().as_millis() as u64,
            cost_usd: handle.cost_usd,
            api_calls: handle.api_calls,
            input_tokens: handle.input_tokens,
            output_tokens: handle.output_tokens,
            cache_hit: handle.cache_hit,
            success,
            completeness_pct: handle.completeness_pct,
            error_kind,
            closed_at: Utc::now(),
        };

        self.append_journal(&sample);

        let snapshot = {
            let mut aggregates = match self.aggregates.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            aggregates.fold(&sample);
            aggregates.clone()
        };
        self.write_aggregate(&snapshot);

        sample
    }

    /// Read-only aggregate snapshot.
    pub fn aggregates(&self) -> Aggregates {
        match self.aggregates.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn append_journal(&self, sample: &BenchmarkSample) {
        let Some(journal) = &self.journal else {
            return;
        };
        let line = match serde_json::to_string(sample) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "benchmark sample serialization failed");
                return;
            }
        };
        let mut file = match journal.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{line}") {
            warn!(error = %e, "benchmark journal append failed");
        }
    }

    fn write_aggregate(&self, snapshot: &Aggregates) {
        let Some(path) = &self.aggregate_path else {
            return;
        };
        match serde_json::to_string_pretty(snapshot) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!(path = %path.display(), error = %e, "aggregate snapshot write failed");
                }
            }
            Err(e) => warn!(error = %e, "aggregate snapshot serialization failed"),
        }
    }
}
