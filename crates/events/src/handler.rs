//! Handler shapes and their type-erased form.
//!
//! Handlers are plain functions or closures:
//!
//! - command handler: `Fn(&Context, &C) -> HandlerResult` for some `C: Command`
//! - event handler:   `Fn(&Context, &E) -> HandlerResult` for some `E: Event`
//!
//! Registration is generic over the concrete message type, so a handler with
//! the wrong shape does not compile. Inside the registry handlers are stored
//! erased, keyed by the message's `TypeId`.

use std::any::type_name;
use std::sync::Arc;

use anyhow::anyhow;

use crate::bus::MessageBus;
use crate::command::Command;
use crate::context::Context;
use crate::error::BusError;
use crate::event::{Event, SharedEvent};
use crate::message::{AsAny, MessageKind};

/// Events produced by a handler, in the order they should be dispatched.
pub type HandlerResult = anyhow::Result<Vec<SharedEvent>>;

pub(crate) type ErasedCommandHandler =
    Box<dyn Fn(&Context, &dyn Command) -> HandlerResult + Send + Sync>;

pub(crate) type ErasedEventHandler = Box<dyn Fn(&Context, &dyn Event) -> HandlerResult + Send + Sync>;

/// What a registered handler accepts; used in logs and errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    pub kind: MessageKind,
    pub message_type: &'static str,
}

impl HandlerDescriptor {
    pub fn command<C: Command>() -> Self {
        Self {
            kind: MessageKind::Command,
            message_type: type_name::<C>(),
        }
    }

    pub fn event<E: Event>() -> Self {
        Self {
            kind: MessageKind::Event,
            message_type: type_name::<E>(),
        }
    }
}

impl core::fmt::Display for HandlerDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} handler for {}", self.kind, self.message_type)
    }
}

pub(crate) fn erase_command_handler<C, F>(handler: F) -> ErasedCommandHandler
where
    C: Command,
    F: Fn(&Context, &C) -> HandlerResult + Send + Sync + 'static,
{
    Box::new(move |ctx: &Context, command: &dyn Command| {
        let command = command
            .as_any()
            .downcast_ref::<C>()
            .ok_or_else(|| anyhow!("command routed to the handler for {}", type_name::<C>()))?;
        handler(ctx, command)
    })
}

pub(crate) fn erase_event_handler<E, F>(handler: F) -> ErasedEventHandler
where
    E: Event,
    F: Fn(&Context, &E) -> HandlerResult + Send + Sync + 'static,
{
    Box::new(move |ctx: &Context, event: &dyn Event| {
        let event = event
            .as_any()
            .downcast_ref::<E>()
            .ok_or_else(|| anyhow!("event routed to the handler for {}", type_name::<E>()))?;
        handler(ctx, event)
    })
}

/// A service exposing several handlers as methods.
///
/// ```ignore
/// impl HandlerSet for OrderService {
///     fn register_handlers(self: Arc<Self>, bus: &MessageBus) -> Result<(), BusError> {
///         let svc = Arc::clone(&self);
///         bus.register_command_handler(move |ctx, cmd: &PlaceOrder| svc.place(ctx, cmd))?;
///         let svc = Arc::clone(&self);
///         bus.register_event_handler(move |ctx, evt: &OrderPlaced| svc.notify(ctx, evt))
///     }
/// }
/// ```
pub trait HandlerSet: Send + Sync + 'static {
    fn register_handlers(self: Arc<Self>, bus: &MessageBus) -> Result<(), BusError>;
}
