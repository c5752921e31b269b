// ==========================================
// Logging initialization
// ==========================================
// tracing + tracing-subscriber
// Log level configurable through the environment
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the logging system.
///
/// # Environment
/// - RUST_LOG: level filter (default: info)
///   e.g. RUST_LOG=debug or RUST_LOG=org_structure_engine=trace
///
/// # Example
/// ```no_run
/// use org_structure_engine::logging;
/// logging::init();
/// ```
pub fn init() {
    // Level filter from the environment, info by default
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();
}

/// Initializes logging for tests.
///
/// More verbose level, output captured by the test harness.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
