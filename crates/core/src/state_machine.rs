//! Table-driven state machine helper.
//!
//! A state type declares its own transition table; [`State`] wraps the current
//! value and only moves along edges present in that table.

use crate::error::{DomainError, DomainResult};

/// Transition table of a state type.
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum OrderStatus { Draft, Placed, Shipped }
///
/// impl Transitions for OrderStatus {
///     fn next_states(&self) -> Option<&'static [Self]> {
///         match self {
///             OrderStatus::Draft => Some(&[OrderStatus::Placed]),
///             OrderStatus::Placed => Some(&[OrderStatus::Shipped]),
///             OrderStatus::Shipped => Some(&[]),
///         }
///     }
/// }
/// ```
pub trait Transitions: Clone + PartialEq + core::fmt::Debug + 'static {
    /// States reachable from `self`.
    ///
    /// `None` means `self` has no entry in the table at all, which makes it
    /// unusable both as an initial and as a current state. `Some(&[])` is a
    /// terminal state.
    fn next_states(&self) -> Option<&'static [Self]>;
}

/// Current value of a state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State<T> {
    current: T,
}

impl<T: Transitions> State<T> {
    /// Start a machine in `initial`, which must have an entry in the table.
    pub fn new(initial: T) -> DomainResult<Self> {
        if initial.next_states().is_none() {
            return Err(DomainError::invalid_transition(format!(
                "could not create state: invalid initial state {initial:?}"
            )));
        }

        Ok(Self { current: initial })
    }

    /// Move to `to` if the table allows it from the current state.
    pub fn transition(&mut self, to: T) -> DomainResult<()> {
        let Some(allowed) = self.current.next_states() else {
            return Err(DomainError::invalid_transition(format!(
                "cannot transition state: invalid current state {:?}",
                self.current
            )));
        };

        if !allowed.contains(&to) {
            return Err(DomainError::invalid_transition(format!(
                "cannot transition state from {:?} to {:?}",
                self.current, to
            )));
        }

        self.current = to;
        Ok(())
    }

    pub fn can_transition(&self, to: &T) -> bool {
        self.current
            .next_states()
            .is_some_and(|allowed| allowed.contains(to))
    }

    pub fn get(&self) -> &T {
        &self.current
    }

    pub fn into_inner(self) -> T {
        self.current
    }
}
