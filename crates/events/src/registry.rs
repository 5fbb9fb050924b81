use std::any::TypeId;
use std::collections::HashMap;

use crate::command::Command;
use crate::context::Context;
use crate::error::BusError;
use crate::event::Event;
use crate::handler::{
    ErasedCommandHandler, ErasedEventHandler, HandlerDescriptor, HandlerResult,
    erase_command_handler, erase_event_handler,
};

pub(crate) struct CommandRoute {
    pub(crate) descriptor: HandlerDescriptor,
    pub(crate) handler: ErasedCommandHandler,
}

pub(crate) struct EventRoute {
    pub(crate) descriptor: HandlerDescriptor,
    pub(crate) handler: ErasedEventHandler,
}

/// Routing table: at most one handler per command type, an ordered list of
/// handlers per event type.
#[derive(Default)]
pub struct HandlerRegistry {
    commands: HashMap<TypeId, CommandRoute>,
    events: HashMap<TypeId, Vec<EventRoute>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_command<C, F>(&mut self, handler: F) -> Result<HandlerDescriptor, BusError>
    where
        C: Command,
        F: Fn(&Context, &C) -> HandlerResult + Send + Sync + 'static,
    {
        let descriptor = HandlerDescriptor::command::<C>();
        let key = TypeId::of::<C>();

        if self.commands.contains_key(&key) {
            return Err(BusError::DuplicateCommandHandler {
                command_type: descriptor.message_type,
            });
        }

        self.commands.insert(
            key,
            CommandRoute {
                descriptor,
                handler: erase_command_handler(handler),
            },
        );
        Ok(descriptor)
    }

    pub fn push_event<E, F>(&mut self, handler: F) -> HandlerDescriptor
    where
        E: Event,
        F: Fn(&Context, &E) -> HandlerResult + Send + Sync + 'static,
    {
        let descriptor = HandlerDescriptor::event::<E>();
        self.events
            .entry(TypeId::of::<E>())
            .or_default()
            .push(EventRoute {
                descriptor,
                handler: erase_event_handler(handler),
            });
        descriptor
    }

    pub fn has_command_handler<C: Command>(&self) -> bool {
        self.commands.contains_key(&TypeId::of::<C>())
    }

    pub fn event_handler_count<E: Event>(&self) -> usize {
        self.events.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }

    pub(crate) fn command_handler(&self, key: TypeId) -> Option<&CommandRoute> {
        self.commands.get(&key)
    }

    pub(crate) fn event_handlers(&self, key: TypeId) -> &[EventRoute] {
        self.events.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl core::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("command_handlers", &self.commands.len())
            .field("event_types", &self.events.len())
            .finish()
    }
}
