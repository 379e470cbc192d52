//! Telemetry helpers for structured logging.

use tracing_subscriber::EnvFilter;

/// Installs the pool's default tracing subscriber: env-filtered, falling
/// back to `info` for this crate when `RUST_LOG` is unset. Hosts that
/// already installed a subscriber keep theirs.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tideway_pool=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
