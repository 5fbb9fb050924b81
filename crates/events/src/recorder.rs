//! Pending-event bookkeeping for aggregates.
//!
//! An aggregate embeds an [`EventRecorder`], records events while it handles
//! a command, and exposes them through [`EventSource`] so a repository can
//! harvest them on save.

use crate::event::{Event, SharedEvent};

/// Anything that accumulates events until someone collects them.
pub trait EventSource {
    /// Events recorded since the last reset, oldest first.
    fn events(&self) -> &[SharedEvent];

    fn reset_events(&mut self);

    /// Return the recorded events and clear them.
    fn take_events(&mut self) -> Vec<SharedEvent> {
        let events = self.events().to_vec();
        self.reset_events();
        events
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Vec<SharedEvent>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event` unless its base was never initialized.
    ///
    /// Returns whether the event was kept.
    pub fn record<E: Event>(&mut self, event: E) -> bool {
        if !event.is_initialized() {
            tracing::debug!(
                event = core::any::type_name::<E>(),
                "ignoring uninitialized event"
            );
            return false;
        }

        self.events.push(std::sync::Arc::new(event));
        true
    }

    pub fn record_shared(&mut self, event: SharedEvent) -> bool {
        if !event.is_initialized() {
            tracing::debug!(event_type = event.event_type(), "ignoring uninitialized event");
            return false;
        }

        self.events.push(event);
        true
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSource for EventRecorder {
    fn events(&self) -> &[SharedEvent] {
        &self.events
    }

    fn reset_events(&mut self) {
        self.events.clear();
    }

    fn take_events(&mut self) -> Vec<SharedEvent> {
        std::mem::take(&mut self.events)
    }
}
