//! Validation helpers for optimizer options and search spaces.
//!
//! - [`verify_positive`]: finite, strictly positive numerical options.
//! - [`verify_maxeval`]: evaluation budgets must be positive when given.
//! - [`verify_start`]: initial vectors must match the bounds and be finite.
use crate::{
    errors::{MprError, MprResult},
    optimization::traits::Bounds,
};

/// Validate a numerical option that must be finite and `> 0`.
///
/// # Errors
/// Returns [`MprError::InvalidTolerance`] naming the option.
pub fn verify_positive(name: &'static str, value: f64) -> MprResult<()> {
    if !value.is_finite() {
        return Err(MprError::InvalidTolerance { name, value, reason: "Value must be finite." });
    }
    if value <= 0.0 {
        return Err(MprError::InvalidTolerance { name, value, reason: "Value must be positive." });
    }
    Ok(())
}

/// Validate an optional evaluation budget.
///
/// # Errors
/// Returns [`MprError::InvalidMaxEval`] for `Some(0)`.
pub fn verify_maxeval(maxeval: Option<usize>) -> MprResult<()> {
    if maxeval == Some(0) {
        return Err(MprError::InvalidMaxEval {
            maxeval: 0,
            reason: "The evaluation budget must be greater than zero.",
        });
    }
    Ok(())
}

/// Validate an initial vector against the search bounds.
///
/// # Errors
/// - [`MprError::ValuesLengthMismatch`] if the dimensions differ.
/// - [`MprError::InvalidTolerance`] for non-finite entries.
pub fn verify_start(x0: &[f64], bounds: &Bounds) -> MprResult<()> {
    if x0.len() != bounds.len() {
        return Err(MprError::ValuesLengthMismatch { expected: bounds.len(), found: x0.len() });
    }
    if let Some(&value) = x0.iter().find(|v| !v.is_finite()) {
        return Err(MprError::InvalidTolerance {
            name: "initial value",
            value,
            reason: "Value must be finite.",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Non-finite and non-positive options are rejected with a reason.
    fn verify_positive_rejects_bad_values() {
        assert!(verify_positive("sd_tolerance", 1e-8).is_ok());
        assert_eq!(
            verify_positive("sd_tolerance", 0.0).unwrap_err(),
            MprError::InvalidTolerance {
                name: "sd_tolerance",
                value: 0.0,
                reason: "Value must be positive.",
            }
        );
        assert!(verify_positive("initial_step", f64::NAN).is_err());
    }

    #[test]
    // Purpose
    // -------
    // Budgets of zero and start vectors of the wrong length fail.
    fn budget_and_start_checks() {
        let bounds = Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();

        assert!(verify_maxeval(None).is_ok());
        assert!(verify_maxeval(Some(0)).is_err());
        assert_eq!(
            verify_start(&[0.5], &bounds).unwrap_err(),
            MprError::ValuesLengthMismatch { expected: 2, found: 1 }
        );
        assert!(verify_start(&[0.5, f64::INFINITY], &bounds).is_err());
    }
}
