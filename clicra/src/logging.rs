//! Diagnostic tracing for debugging `clicra`.
//!
//! Tracing goes to stderr and is separate from operator-facing output, which
//! the session writes itself.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn`, or `clicra=debug` when `verbose`.
///
/// # Example
/// ```bash
/// RUST_LOG=clicra=trace clicra "list files"
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,clicra=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
