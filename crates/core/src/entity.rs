//! Identity for the two indexed records.

/// Something addressed by a stable id.
///
/// Job seekers and jobs are entities: two payloads carrying the same id describe
/// the same entity, and the later one overwrites the earlier one.
pub trait Entity {
    /// Id type; its `Display` form is the document key in the search index.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;
}
