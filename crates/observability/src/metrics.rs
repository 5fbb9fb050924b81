use std::time::Duration;

use busline_events::{DispatchStatus, MetricsHook};

/// [`MetricsHook`] that emits one structured tracing event per observation.
///
/// Failures are logged at `warn`, everything else at `debug`; a log pipeline
/// can aggregate them by the `kind`, `message_type` and `status` fields.
#[derive(Debug, Default, Copy, Clone)]
pub struct TracingMetrics;

fn observe(kind: &'static str, message_type: &str, status: DispatchStatus, elapsed: Duration) {
    let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

    match status {
        DispatchStatus::Error => tracing::warn!(
            kind,
            message_type,
            status = status.as_str(),
            elapsed_us,
            "dispatch observed"
        ),
        _ => tracing::debug!(
            kind,
            message_type,
            status = status.as_str(),
            elapsed_us,
            "dispatch observed"
        ),
    }
}

impl MetricsHook for TracingMetrics {
    fn observe_command(&self, command_type: &str, status: DispatchStatus, elapsed: Duration) {
        observe("command", command_type, status, elapsed);
    }

    fn observe_event(&self, event_type: &str, status: DispatchStatus, elapsed: Duration) {
        observe("event", event_type, status, elapsed);
    }
}
