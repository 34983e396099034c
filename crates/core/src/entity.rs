//! Entity trait: identity that survives state changes.

/// Entity marker + minimal interface.
///
/// A shipment group keeps its identity while its dates and lines are edited;
/// combine and split produce new identities rather than mutating old ones.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
