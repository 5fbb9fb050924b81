//! Static bidirectional value mapping.
//!
//! Typical use: translating between a domain enum and its stable wire/storage
//! tag without writing two `match` blocks that can drift apart.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{DomainError, DomainResult};

/// One-to-one mapping between `From` and `To` values.
#[derive(Debug, Clone)]
pub struct Mapper<From, To> {
    to: HashMap<From, To>,
    from: HashMap<To, From>,
}

impl<From, To> Mapper<From, To>
where
    From: Clone + Eq + Hash + core::fmt::Debug,
    To: Clone + Eq + Hash + core::fmt::Debug,
{
    /// Build a mapper from `(from, to)` pairs.
    ///
    /// Fails if a key or a value appears twice, since the mapping would no
    /// longer be invertible.
    pub fn new(pairs: impl IntoIterator<Item = (From, To)>) -> DomainResult<Self> {
        let mut to = HashMap::new();
        let mut from = HashMap::new();

        for (k, v) in pairs {
            if to.contains_key(&k) {
                return Err(DomainError::mapping(format!("key already exists: {k:?}")));
            }
            if from.contains_key(&v) {
                return Err(DomainError::mapping(format!("value already exists: {v:?}")));
            }

            to.insert(k.clone(), v.clone());
            from.insert(v, k);
        }

        Ok(Self { to, from })
    }

    pub fn to(&self, from: &From) -> DomainResult<To> {
        self.to
            .get(from)
            .cloned()
            .ok_or_else(|| DomainError::mapping(format!("no mapping found for {from:?}")))
    }

    pub fn to_or(&self, from: &From, default: To) -> To {
        self.to.get(from).cloned().unwrap_or(default)
    }

    pub fn from(&self, to: &To) -> DomainResult<From> {
        self.from
            .get(to)
            .cloned()
            .ok_or_else(|| DomainError::mapping(format!("no mapping found for {to:?}")))
    }

    pub fn from_or(&self, to: &To, default: From) -> From {
        self.from.get(to).cloned().unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.to.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Priority {
        Low,
        High,
        Urgent,
    }

    fn priorities() -> Mapper<Priority, &'static str> {
        Mapper::new([(Priority::Low, "low"), (Priority::High, "high")]).unwrap()
    }

    #[test]
    fn maps_both_directions() {
        let m = priorities();
        assert_eq!(m.to(&Priority::High).unwrap(), "high");
        assert_eq!(m.from(&"low").unwrap(), Priority::Low);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn missing_entries_error_or_fall_back() {
        let m = priorities();
        assert!(m.to(&Priority::Urgent).is_err());
        assert!(m.from(&"urgent").is_err());
        assert_eq!(m.to_or(&Priority::Urgent, "unknown"), "unknown");
        assert_eq!(m.from_or(&"urgent", Priority::Low), Priority::Low);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = Mapper::new([(1, "a"), (1, "b")]).unwrap_err();
        assert_eq!(err, DomainError::mapping("key already exists: 1"));
    }

    #[test]
    fn duplicate_values_are_rejected() {
        let err = Mapper::new([(1, "a"), (2, "a")]).unwrap_err();
        assert!(err.to_string().contains("value already exists"));
    }
}
