//! Salary range value object.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A salary range with the invariant `0 <= min <= max`.
///
/// The invariant is checked on construction, on deserialization and on every
/// update. A rejected update returns an error and leaves the range unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SalaryRange")]
pub struct Salary {
    min: f64,
    max: f64,
}

/// Unvalidated wire shape of a salary range.
#[derive(Debug, Deserialize)]
struct SalaryRange {
    min: f64,
    max: f64,
}

impl TryFrom<SalaryRange> for Salary {
    type Error = DomainError;

    fn try_from(raw: SalaryRange) -> Result<Self, Self::Error> {
        Salary::new(raw.min, raw.max)
    }
}

impl Salary {
    /// Upper bound used when a payload carries no salary.
    pub const DEFAULT_MAX: f64 = 300_000.0;

    pub fn new(min: f64, max: f64) -> DomainResult<Self> {
        check_bound("min", min)?;
        check_bound("max", max)?;
        check_order(min, max)?;
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn set_min(&mut self, min: f64) -> DomainResult<()> {
        self.update_range(Some(min), None)
    }

    pub fn set_max(&mut self, max: f64) -> DomainResult<()> {
        self.update_range(None, Some(max))
    }

    /// Update either bound (or both) atomically.
    ///
    /// The candidate range is validated as a whole, so moving both bounds at once
    /// is accepted as long as the final range is ordered.
    pub fn update_range(&mut self, min: Option<f64>, max: Option<f64>) -> DomainResult<()> {
        let next = Salary::new(min.unwrap_or(self.min), max.unwrap_or(self.max))?;
        *self = next;
        Ok(())
    }
}

impl Default for Salary {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: Self::DEFAULT_MAX,
        }
    }
}

impl ValueObject for Salary {}

impl core::fmt::Display for Salary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Salary(min={:.2}$, max={:.2}$)", self.min, self.max)
    }
}

fn check_bound(name: &str, value: f64) -> DomainResult<()> {
    if !value.is_finite() {
        return Err(DomainError::validation(format!("salary {name} must be a finite number")));
    }
    if value < 0.0 {
        return Err(DomainError::validation(format!("salary {name} cannot be negative")));
    }
    Ok(())
}

fn check_order(min: f64, max: f64) -> DomainResult<()> {
    if min > max {
        return Err(DomainError::invariant(format!(
            "minimum salary ({min}) cannot be greater than maximum salary ({max})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn construction_rejects_inverted_range() {
        let err = Salary::new(120_000.0, 50_000.0).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn construction_rejects_negative_and_non_finite_bounds() {
        assert!(matches!(Salary::new(-1.0, 10.0), Err(DomainError::Validation(_))));
        assert!(matches!(Salary::new(0.0, f64::NAN), Err(DomainError::Validation(_))));
        assert!(matches!(Salary::new(0.0, f64::INFINITY), Err(DomainError::Validation(_))));
    }

    #[test]
    fn equal_bounds_are_allowed() {
        let s = Salary::new(80_000.0, 80_000.0).unwrap();
        assert_eq!(s.min(), s.max());
    }

    #[test]
    fn rejected_update_leaves_range_unchanged() {
        let mut s = Salary::new(50_000.0, 120_000.0).unwrap();

        assert!(s.set_min(130_000.0).is_err());
        assert!(s.set_max(40_000.0).is_err());
        assert!(s.update_range(Some(10.0), Some(5.0)).is_err());

        assert_eq!(s, Salary::new(50_000.0, 120_000.0).unwrap());
    }

    #[test]
    fn moving_both_bounds_together_is_accepted() {
        let mut s = Salary::new(50_000.0, 60_000.0).unwrap();
        s.update_range(Some(200_000.0), Some(250_000.0)).unwrap();
        assert_eq!(s.min(), 200_000.0);
        assert_eq!(s.max(), 250_000.0);
    }

    #[test]
    fn deserialization_enforces_invariant() {
        let ok: Salary = serde_json::from_str(r#"{"min": 100000, "max": 120000}"#).unwrap();
        assert_eq!(ok.min(), 100_000.0);

        let bad = serde_json::from_str::<Salary>(r#"{"min": 5, "max": 1}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn default_range_is_open_ended_enough() {
        let s = Salary::default();
        assert_eq!(s.min(), 0.0);
        assert_eq!(s.max(), Salary::DEFAULT_MAX);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: any successfully constructed salary is ordered.
        #[test]
        fn constructed_salary_is_ordered(min in 0.0f64..1e9, max in 0.0f64..1e9) {
            match Salary::new(min, max) {
                Ok(s) => prop_assert!(s.min() <= s.max()),
                Err(_) => prop_assert!(min > max),
            }
        }

        /// Property: a sequence of updates never breaks the invariant, and a
        /// rejected update never changes the state.
        #[test]
        fn updates_preserve_invariant(
            updates in prop::collection::vec(
                (prop::option::of(0.0f64..1e6), prop::option::of(0.0f64..1e6)),
                1..20
            )
        ) {
            let mut s = Salary::default();
            for (min, max) in updates {
                let before = s;
                match s.update_range(min, max) {
                    Ok(()) => prop_assert!(s.min() <= s.max()),
                    Err(_) => prop_assert_eq!(s, before),
                }
            }
        }
    }
}
