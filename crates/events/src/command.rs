use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use busline_core::CommandId;

use crate::message::{AsAny, MessageFactory};

/// Identity data carried by every command.
///
/// `Default` yields an uninitialized base (nil id, empty type). Commands built
/// that way are still dispatched; routing goes by Rust type, not by tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBase {
    id: CommandId,
    command_type: String,
    timestamp: DateTime<Utc>,
}

impl CommandBase {
    pub fn new(command_type: impl Into<String>, factory: &MessageFactory) -> Self {
        let mut base = Self::default();
        base.init(command_type, factory);
        base
    }

    /// Assign a fresh id, the type tag and the current time.
    pub fn init(&mut self, command_type: impl Into<String>, factory: &MessageFactory) {
        self.id = CommandId::from_uuid(factory.next_id());
        self.command_type = command_type.into();
        self.timestamp = factory.now();
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn command_type(&self) -> &str {
        &self.command_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A request to change state. Exactly one handler per concrete type.
pub trait Command: AsAny + core::fmt::Debug + Send + Sync {
    fn base(&self) -> &CommandBase;

    fn command_id(&self) -> CommandId {
        self.base().id()
    }

    fn command_type(&self) -> &str {
        self.base().command_type()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.base().timestamp()
    }
}

impl dyn Command {
    pub fn downcast_ref<C: Command>(&self) -> Option<&C> {
        self.as_any().downcast_ref::<C>()
    }
}

/// Implement [`Command`] for a type that keeps its [`CommandBase`] in a field.
///
/// ```ignore
/// #[derive(Debug)]
/// struct PlaceOrder { base: CommandBase, sku: String }
/// impl_command!(PlaceOrder);           // field named `base`
/// impl_command!(CancelOrder, header);  // any other field name
/// ```
#[macro_export]
macro_rules! impl_command {
    ($ty:ty) => {
        $crate::impl_command!($ty, base);
    };
    ($ty:ty, $field:ident) => {
        impl $crate::Command for $ty {
            fn base(&self) -> &$crate::CommandBase {
                &self.$field
            }
        }
    };
}
