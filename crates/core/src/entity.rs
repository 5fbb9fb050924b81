//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Repositories can derive their identity-equality predicate from this trait
/// (two entities are the same logical entity when their ids are equal).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Entities sharing an identifier are the same logical entity.
pub fn same_identity<E: Entity>(a: &E, b: &E) -> bool {
    a.id() == b.id()
}
