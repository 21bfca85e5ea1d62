//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**; two instances with the same attribute values
/// are interchangeable. In this crate [`crate::Salary`] is a value object while
/// [`crate::JobSeeker`] and [`crate::Job`] are entities.
///
/// Mutating operations on a value object must validate the resulting state and
/// leave the original untouched when validation fails.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
