//! Public API surface of the black-box search.
//!
//! - [`Optimizer`]: strategy interface the calibrator delegates to.
//! - [`Bounds`]: box constraints in the calibrator's coefficient order.
//! - [`Algorithm`] and [`NelderMeadOptions`]: backend choice and settings.
//! - [`OptimOutcome`]: normalized result of one search.
//!
//! Convention: objectives return a likelihood `ℓ(x)` to be *maximized*;
//! backends that minimize work on `c(x) = -ℓ(x)` internally.
use std::{str::FromStr, sync::Arc};

use crate::{
    errors::{MprError, MprResult},
    optimization::{
        nelder_mead::NelderMeadOptimizer,
        validation::{verify_maxeval, verify_positive},
    },
};

/// Likelihood callback evaluated at candidate coefficient vectors.
pub type Objective<'a> = dyn FnMut(&[f64]) -> MprResult<f64> + 'a;

/// Derivative-free maximizer.
///
/// Implementations evaluate `objective` only at points inside `bounds`, at
/// most `maxeval` times when a budget is given, and return the best point
/// they evaluated.
pub trait Optimizer: Send + Sync {
    fn optimize(
        &self, objective: &mut Objective<'_>, bounds: &Bounds, x0: &[f64], maxeval: Option<usize>,
    ) -> MprResult<OptimOutcome>;

    fn name(&self) -> &'static str;
}

/// Box constraints; infinite entries mean "unbounded on that side".
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    /// # Errors
    /// - [`MprError::ValuesLengthMismatch`] if the vectors differ in length.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> MprResult<Self> {
        if lower.len() != upper.len() {
            return Err(MprError::ValuesLengthMismatch { expected: lower.len(), found: upper.len() });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Move every entry of `x` into `[lower, upper]`.
    pub fn project(&self, x: &mut [f64]) {
        for ((v, &lo), &hi) in x.iter_mut().zip(&self.lower).zip(&self.upper) {
            *v = v.max(lo).min(hi);
        }
    }

    /// Width of dimension `i`, or `None` if unbounded.
    pub fn width(&self, i: usize) -> Option<f64> {
        let w = self.upper[i] - self.lower[i];
        w.is_finite().then_some(w)
    }
}

/// Choice of black-box backend.
///
/// Parsing:
/// This enum implements `FromStr` and accepts case-insensitive names
/// (`"NelderMead"`, `"nelder_mead"`). Unknown names return
/// `MprError::InvalidAlgorithm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    NelderMead,
}

impl Algorithm {
    /// Build the backend with the given options.
    pub fn build(self, options: NelderMeadOptions) -> Arc<dyn Optimizer> {
        match self {
            Algorithm::NelderMead => Arc::new(NelderMeadOptimizer::new(options)),
        }
    }
}

impl FromStr for Algorithm {
    type Err = MprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "").as_str() {
            "neldermead" => Ok(Algorithm::NelderMead),
            _ => Err(MprError::InvalidAlgorithm {
                name: s.to_string(),
                reason: "Valid options are case insensitive 'NelderMead' or 'nelder_mead'.",
            }),
        }
    }
}

/// Nelder–Mead configuration.
///
/// Fields:
/// - `max_iters`: cap on solver iterations (each costs one or more
///   objective evaluations).
/// - `sd_tolerance`: stop when the standard deviation of the simplex costs
///   falls below this value.
/// - `initial_step`: size of the initial simplex edges as a fraction of the
///   bound width (absolute step for unbounded dimensions).
/// - `verbose`: attach a terminal observer (behind the `obs_slog` feature).
///
/// Default: `max_iters = 500`, `sd_tolerance = 1e-8`, `initial_step = 0.1`,
/// `verbose = false`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NelderMeadOptions {
    pub max_iters: usize,
    pub sd_tolerance: f64,
    pub initial_step: f64,
    pub verbose: bool,
}

impl NelderMeadOptions {
    /// # Errors
    /// - [`MprError::InvalidMaxEval`] if `max_iters == 0`.
    /// - [`MprError::InvalidTolerance`] for non-finite or non-positive
    ///   `sd_tolerance`/`initial_step`.
    pub fn new(
        max_iters: usize, sd_tolerance: f64, initial_step: f64, verbose: bool,
    ) -> MprResult<Self> {
        verify_maxeval(Some(max_iters))?;
        verify_positive("sd_tolerance", sd_tolerance)?;
        verify_positive("initial_step", initial_step)?;
        Ok(Self { max_iters, sd_tolerance, initial_step, verbose })
    }
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self { max_iters: 500, sd_tolerance: 1e-8, initial_step: 0.1, verbose: false }
    }
}

/// Result of one black-box search.
///
/// - `x_hat`: best evaluated point (inside the bounds).
/// - `value`: likelihood `ℓ(x_hat)`.
/// - `evaluations`: objective calls spent.
/// - `status`: human-readable termination reason.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimOutcome {
    pub x_hat: Vec<f64>,
    pub value: f64,
    pub evaluations: usize,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Algorithm names parse case-insensitively with or without underscore.
    fn algorithm_from_str() {
        assert_eq!("NELDER_MEAD".parse::<Algorithm>().unwrap(), Algorithm::NelderMead);
        assert_eq!("neldermead".parse::<Algorithm>().unwrap(), Algorithm::NelderMead);
        assert!(matches!(
            "bobyqa".parse::<Algorithm>().unwrap_err(),
            MprError::InvalidAlgorithm { .. }
        ));
    }

    #[test]
    // Purpose
    // -------
    // Projection moves entries into the box and leaves unbounded sides
    // alone.
    fn bounds_project_and_width() {
        let bounds = Bounds::new(vec![0.0, f64::NEG_INFINITY], vec![1.0, 2.0]).unwrap();
        let mut x = [1.5, -100.0];

        bounds.project(&mut x);

        assert_eq!(x, [1.0, -100.0]);
        assert_eq!(bounds.width(0), Some(1.0));
        assert_eq!(bounds.width(1), None);
    }

    #[test]
    // Purpose
    // -------
    // Option constructors validate their inputs.
    fn nelder_mead_options_validate() {
        assert!(NelderMeadOptions::new(100, 1e-6, 0.2, false).is_ok());
        assert!(NelderMeadOptions::new(0, 1e-6, 0.2, false).is_err());
        assert!(NelderMeadOptions::new(100, -1.0, 0.2, false).is_err());
    }
}
