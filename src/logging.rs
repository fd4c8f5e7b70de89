//! Logging setup.
//!
//! Kernel diagnostics go to stderr through `tracing`. While output capture
//! is installed, stderr is a publish channel, so log lines reach the
//! notebook as `stderr` stream events.

use tracing_subscriber::EnvFilter;

use crate::config::KernelConfig;

const FALLBACK_FILTER: &str = "info";

/// Parse `filter`, falling back to `info` when it is not a valid directive list
fn build_filter(filter: &str) -> EnvFilter {
    EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(filter))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false)
        .compact()
        .try_init();
}

/// Install the global subscriber with the configured `log_filter`.
///
/// Call [`KernelConfig::apply_env`] first for `JITCELL_LOG` to take effect.
pub fn init_from(config: &KernelConfig) {
    init(&config.log_filter);
}
