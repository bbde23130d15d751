//! Tracing subscriber setup.
//!
//! Backends emit `tracing` events for commits, backups and queries under the
//! `tabula_core` target. Installing a subscriber is left to the caller; these
//! helpers do it for binaries and test suites. Without the `logging` feature
//! they compile to no-ops.
//!
//! The filter is read from `TABULA_LOG`, then `RUST_LOG`, then falls back to
//! the requested level for this crate only.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "TABULA_LOG";

/// Filter directive limiting output to this crate at `level`.
pub fn crate_directive(level: &str) -> String {
    format!("{}={}", env!("CARGO_CRATE_NAME"), level.trim().to_ascii_lowercase())
}

#[cfg(feature = "logging")]
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(crate_directive(level)))
}

/// Install a subscriber at `info`.
///
/// ```rust
/// tabula_core::logging::init();
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Install a subscriber at `level` unless the environment overrides it.
/// A second call is ignored.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let _ = fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_line_number(true)
        .try_init();
}

/// Debug-level output captured by the test harness.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
