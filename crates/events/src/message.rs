//! Plumbing shared by commands and events.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use busline_core::{Clock, IdGenerator, SystemClock, UuidV7Generator};

use crate::{CommandBase, EventBase};

/// Upcast to `&dyn Any` so type-erased messages can be routed and downcast.
///
/// Implemented for every `'static` type; message traits use it as a
/// supertrait.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The two message capabilities a handler can accept.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Command,
    Event,
}

impl core::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MessageKind::Command => f.write_str("command"),
            MessageKind::Event => f.write_str("event"),
        }
    }
}

/// Stamps new messages with identifiers and timestamps.
///
/// Bundles the injectable [`Clock`] and [`IdGenerator`] so command and event
/// construction is deterministic wherever a test supplies fixed sources.
#[derive(Clone)]
pub struct MessageFactory {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl MessageFactory {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { clock, ids }
    }

    /// Wall clock + UUIDv7 identifiers.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(UuidV7Generator))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn next_id(&self) -> Uuid {
        self.ids.next_id()
    }

    /// Initialized base data for a command of type `command_type`.
    pub fn command(&self, command_type: impl Into<String>) -> CommandBase {
        CommandBase::new(command_type, self)
    }

    /// Initialized base data for an event of type `event_type`.
    pub fn event(&self, event_type: impl Into<String>) -> EventBase {
        EventBase::new(event_type, self)
    }
}

impl Default for MessageFactory {
    fn default() -> Self {
        Self::system()
    }
}

impl core::fmt::Debug for MessageFactory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageFactory").finish_non_exhaustive()
    }
}
