//! Shared tracing/logging setup.

pub mod tracing;

pub use crate::tracing::{LogConfig, LogFormat};

/// Initialize process-wide logging from `RUST_LOG` / `LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    let config = LogConfig::from_lookup(|key| std::env::var(key).ok());
    crate::tracing::init(&config);
}
