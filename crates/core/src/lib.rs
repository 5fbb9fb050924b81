//! `busline-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no dispatch, no storage):
//! identifiers and their generators, an injectable clock, the entity trait, a
//! table-driven state machine and a bidirectional value mapper.

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod mapper;
pub mod state_machine;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::{Entity, same_identity};
pub use error::{DomainError, DomainResult};
pub use id::{CommandId, EntityId, EventId, IdGenerator, SequentialIdGenerator, UuidV7Generator};
pub use mapper::Mapper;
pub use state_machine::{State, Transitions};
