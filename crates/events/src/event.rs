use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use busline_core::{DomainError, DomainResult, EntityId, EventId};

use crate::message::{AsAny, MessageFactory};

/// Events travel through the bus and the recorders behind a shared pointer.
pub type SharedEvent = Arc<dyn Event>;

/// The entity an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: EntityId,
}

/// Identity data carried by every event.
///
/// A base obtained through `Default` is *uninitialized*; recorders refuse to
/// keep events whose base was never initialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBase {
    id: EventId,
    event_type: String,
    timestamp: DateTime<Utc>,
    entity: Option<EntityRef>,
    #[serde(skip)]
    initialized: bool,
}

impl EventBase {
    pub fn new(event_type: impl Into<String>, factory: &MessageFactory) -> Self {
        let mut base = Self::default();
        base.init(event_type, factory);
        base
    }

    /// Assign a fresh id, the type tag and the current time, and mark the
    /// base initialized.
    pub fn init(&mut self, event_type: impl Into<String>, factory: &MessageFactory) {
        self.id = EventId::from_uuid(factory.next_id());
        self.event_type = event_type.into();
        self.timestamp = factory.now();
        self.initialized = true;
    }

    /// Attach the entity this event is about. Only allowed once.
    pub fn set_entity(
        &mut self,
        entity_type: impl Into<String>,
        entity_id: EntityId,
    ) -> DomainResult<()> {
        if let Some(existing) = &self.entity {
            return Err(DomainError::invariant(format!(
                "event entity already set to {} {}",
                existing.entity_type, existing.entity_id
            )));
        }

        self.entity = Some(EntityRef {
            entity_type: entity_type.into(),
            entity_id,
        });
        Ok(())
    }

    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: EntityId,
    ) -> DomainResult<Self> {
        self.set_entity(entity_type, entity_id)?;
        Ok(self)
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn entity(&self) -> Option<&EntityRef> {
        self.entity.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// A fact that something happened.
///
/// Any number of handlers may react to a given concrete event type.
pub trait Event: AsAny + core::fmt::Debug + Send + Sync {
    fn base(&self) -> &EventBase;

    fn event_id(&self) -> EventId {
        self.base().id()
    }

    fn event_type(&self) -> &str {
        self.base().event_type()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.base().timestamp()
    }

    fn entity(&self) -> Option<&EntityRef> {
        self.base().entity()
    }

    fn is_initialized(&self) -> bool {
        self.base().is_initialized()
    }
}

impl dyn Event {
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    pub fn is<E: Event>(&self) -> bool {
        self.as_any().is::<E>()
    }
}

/// Move an event behind a [`SharedEvent`] pointer.
pub trait IntoSharedEvent {
    fn into_shared(self) -> SharedEvent;
}

impl<E: Event> IntoSharedEvent for E {
    fn into_shared(self) -> SharedEvent {
        Arc::new(self)
    }
}

/// Implement [`Event`] for a type that keeps its [`EventBase`] in a field.
///
/// Same shape as [`impl_command!`](crate::impl_command).
#[macro_export]
macro_rules! impl_event {
    ($ty:ty) => {
        $crate::impl_event!($ty, base);
    };
    ($ty:ty, $field:ident) => {
        impl $crate::Event for $ty {
            fn base(&self) -> &$crate::EventBase {
                &self.$field
            }
        }
    };
}
