//! Structured logging setup using `tracing-subscriber`.
//!
//! Human-readable output to stderr, filtered by `RUST_LOG` (default: `info`).

use tracing_subscriber::EnvFilter;

/// Initialise logging for the `herald` binary.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
