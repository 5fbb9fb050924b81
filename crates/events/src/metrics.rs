use std::time::Duration;

/// Outcome of one handler invocation (or the lack of one).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DispatchStatus {
    Ok,
    Error,
    NoHandler,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Ok => "ok",
            DispatchStatus::Error => "error",
            DispatchStatus::NoHandler => "no_handler",
        }
    }
}

/// Callback surface the dispatch loop reports to.
///
/// Called on the dispatch task; implementations must not block.
pub trait MetricsHook: Send + Sync {
    fn observe_command(&self, command_type: &str, status: DispatchStatus, elapsed: Duration);

    fn observe_event(&self, event_type: &str, status: DispatchStatus, elapsed: Duration);
}

#[derive(Debug, Default, Copy, Clone)]
pub struct NoopMetrics;

impl MetricsHook for NoopMetrics {
    fn observe_command(&self, _: &str, _: DispatchStatus, _: Duration) {}

    fn observe_event(&self, _: &str, _: DispatchStatus, _: Duration) {}
}
