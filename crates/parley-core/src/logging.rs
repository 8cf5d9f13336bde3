//! Structured logging setup with `tracing`.
//!
//! Session and batch IDs travel as span/event fields, never as global
//! state; components receive no logger handle because `tracing` macros
//! resolve the active subscriber themselves.

use tracing_subscriber::EnvFilter;

/// Install the process-wide subscriber: env-filtered (`PARLEY_LOG`,
/// default `info`), compact output to stderr.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_env("PARLEY_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Same as [`init`] but emits JSON lines, for log-shipping environments.
pub fn init_json() {
    let filter = EnvFilter::try_from_env("PARLEY_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
