//! Cancellation and deadline propagation.
//!
//! A [`Context`] travels with every submission: the submitter's context is
//! handed to the command handler, the bus's own context to event handlers and
//! to the dispatch loop. Cancelling a context cancels every context derived
//! from it, never its parent.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context is done.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    DeadlineExceeded,
}

impl core::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CancelReason::Cancelled => f.write_str("context canceled"),
            CancelReason::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never done unless cancelled explicitly.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derived context: done when `self` is, or when cancelled itself.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derived context that also expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derived context that also expires at `deadline` (the earlier deadline
    /// wins when `self` already has one).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };

        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and everything derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `Some(reason)` once the context is done.
    pub fn err(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves when the context is done.
    pub async fn done(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => CancelReason::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_not_done() {
        let ctx = Context::background();
        assert_eq!(ctx.err(), None);
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn cancelling_parent_cancels_child_but_not_the_reverse() {
        let parent = Context::background();
        let child = parent.child();

        child.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());

        let other = parent.child();
        parent.cancel();
        assert_eq!(other.err(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn earlier_deadline_wins() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let longer = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(longer.deadline(), ctx.deadline());
    }

    #[tokio::test]
    async fn done_resolves_on_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        assert_eq!(ctx.done().await, CancelReason::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn done_resolves_on_cancel() {
        let ctx = Context::background();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.done().await });

        ctx.cancel();
        assert_eq!(task.await.unwrap(), CancelReason::Cancelled);
    }
}
