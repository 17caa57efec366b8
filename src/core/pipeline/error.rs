//! Pipeline Error Taxonomy
//!
//! Only schema mismatches and cancellation surface as top-level errors.
//! Everything else degrades: the failing phase contributes an error kind to
//! the report and the pipeline continues.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Non-fatal degradation kinds plus the fatal markers, as recorded on
/// reports and benchmark samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SearchProviderUnavailable,
    CrawlEmpty,
    ExtractFailed,
    PhaseTimeout,
    SchemaMismatch,
    CacheCorrupt,
    Canceled,
}

/// Fatal pipeline failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("request canceled")]
    Canceled,

    #[error("storage setup failed: {0}")]
    Storage(#[from] std::io::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Why a phase run failed, with the metrics it accumulated before failing.
#[derive(Debug)]
pub struct PhaseFailure {
    pub kind: ErrorKind,
    pub metrics: super::context::PhaseMetrics,
}

impl PhaseFailure {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            metrics: super::context::PhaseMetrics::default(),
        }
    }
}
