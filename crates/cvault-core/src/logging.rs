//! Tracing subscriber setup for binaries and embedding shells.
//!
//! `RUST_LOG` wins over the configured level; calling this twice is a
//! no-op, so tests can initialize freely.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
