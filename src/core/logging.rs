//! Logging Setup
//!
//! Tracing initialization for the binary: a fmt layer honoring `RUST_LOG`,
//! defaulting to `info` for this crate. Library code only emits events; it
//! never installs a subscriber.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("instprofiler=info,warn"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// JSON-lines variant for machine-read logs.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("instprofiler=info,warn"));
    let _ = fmt().json().with_env_filter(filter).try_init();
}
