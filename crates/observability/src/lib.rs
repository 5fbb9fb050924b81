//! Process-wide logging setup and a tracing-backed dispatch metrics hook.

/// Install the JSON subscriber for the process. Later calls are no-ops.
pub fn init() {
    tracing::init();
}

pub mod metrics;
/// Subscriber installation (filters, formatting).
pub mod tracing;

pub use self::metrics::TracingMetrics;
pub use self::tracing::init_for_tests;
