//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Records such as allocations or restock requests are entities: they keep
/// their identity while their status moves on, but they are not aggregates
/// with their own decision logic.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
