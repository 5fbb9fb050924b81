//! `busline-events` — messages and the message bus.
//!
//! - [`Command`] / [`Event`]: message capabilities with their base data
//! - [`EventRecorder`] / [`EventSource`]: pending events on aggregates
//! - [`Context`]: cancellation and deadlines
//! - [`MessageBus`]: single-loop dispatcher with breadth-first event cascade

pub mod bus;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod queue;
pub mod recorder;
pub mod registry;

pub use bus::{BusState, MessageBus, MessageBusBuilder};
pub use command::{Command, CommandBase};
pub use config::BusConfig;
pub use context::{CancelReason, Context};
pub use error::{BusError, SubmitStage};
pub use event::{EntityRef, Event, EventBase, IntoSharedEvent, SharedEvent};
pub use handler::{HandlerDescriptor, HandlerResult, HandlerSet};
pub use message::{AsAny, MessageFactory, MessageKind};
pub use metrics::{DispatchStatus, MetricsHook, NoopMetrics};
pub use queue::EventQueue;
pub use recorder::{EventRecorder, EventSource};
pub use registry::HandlerRegistry;
