/// Institution Profiler
///
/// Core library building structured profiles of named institutions from
/// unstructured web sources: input resolution against a known-institution
/// dictionary, a cached search -> crawl -> extract pipeline, media and
/// quality scoring, and per-request benchmarking.
pub mod config;
pub mod core;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
