//! Tracing initialization.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

const DEFAULT_FILTER: &str = "warn";

/// `FETCHKIT_LOG`, then `RUST_LOG`, then `warn`.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("FETCHKIT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Log to stderr so command output on stdout stays machine-readable.
pub fn init() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(env_filter())
        .try_init()
}
