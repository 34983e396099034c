//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Ship windows and date constraints are value objects: two windows with the
/// same bounds are interchangeable no matter which collection lookup produced
/// them. To "modify" one, build a new value.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct DateRange {
///     start: Option<NaiveDate>,
///     end: Option<NaiveDate>,
/// }
///
/// impl ValueObject for DateRange {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
