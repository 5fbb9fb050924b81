//! Strongly-typed identifiers used across the library.
//!
//! Identifiers are generated through an [`IdGenerator`] so that message and
//! entity construction stays deterministic in tests.

use core::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a command message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(Uuid);

/// Identifier of a domain event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

/// Identifier of a domain entity (or aggregate root).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer an injected [`IdGenerator`] in
            /// code that must be deterministic.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Create an identifier from the next value of `ids`.
            pub fn generate(ids: &dyn IdGenerator) -> Self {
                Self(ids.next_id())
            }

            /// The nil identifier, used by messages that were never initialized.
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(CommandId, "CommandId");
impl_uuid_newtype!(EventId, "EventId");
impl_uuid_newtype!(EntityId, "EntityId");

/// Source of fresh identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Uuid;
}

/// Time-ordered UUIDv7 identifiers (the default generator).
#[derive(Debug, Default, Copy, Clone)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn next_id(&self) -> Uuid {
        Uuid::now_v7()
    }
}

/// Deterministic generator yielding `1, 2, 3, ...` encoded as UUIDs.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Uuid::from_u128(u128::from(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_identifier_is_nil() {
        assert!(EventId::default().is_nil());
        assert!(!EventId::new().is_nil());
    }

    #[test]
    fn parse_rejects_garbage_with_type_name() {
        let err = "not-a-uuid".parse::<EntityId>().unwrap_err();
        match err {
            DomainError::InvalidId(msg) => assert!(msg.starts_with("EntityId")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_and_parse_agree() {
        let id = CommandId::new();
        let parsed: CommandId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn sequential_generator_is_deterministic() {
        let ids = SequentialIdGenerator::new();
        let first = EventId::generate(&ids);
        let second = EventId::generate(&ids);

        assert_eq!(first.as_uuid().as_u128(), 1);
        assert_eq!(second.as_uuid().as_u128(), 2);
    }

    #[test]
    fn serializes_as_plain_uuid_string() {
        let id = EntityId::from_uuid(Uuid::from_u128(7));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", Uuid::from_u128(7)));
    }
}
