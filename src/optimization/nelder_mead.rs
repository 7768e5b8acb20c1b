//! Nelder–Mead backend built on `argmin`.
//!
//! Purpose
//! -------
//! Provide the default [`Optimizer`]: argmin's derivative-free Nelder–Mead
//! simplex search, made bound-aware and budget-exact through
//! [`ArgMinAdapter`].
//!
//! Key behaviors
//! -------------
//! - The initial simplex is `x0` plus one vertex per dimension, shifted by
//!   `initial_step` times the bound width (or by `initial_step` itself for
//!   unbounded dimensions). Vertices are projected into the box.
//! - The simplex is evaluated through the adapter before the executor
//!   starts, so objective errors on a vertex propagate as `Err` and a
//!   budget smaller than the simplex ends the search right there.
//! - The run stops on `sd_tolerance`, on `max_iters`, or when the adapter
//!   refuses an evaluation beyond `maxeval`; the last case is a normal
//!   termination, not an error.
//! - The returned point is the best *evaluated* point, which always lies
//!   inside the bounds.
//!
//! Testing notes
//! -------------
//! - Unit tests cover convergence on a smooth concave bowl, exact budget
//!   accounting (including budgets below the simplex size), and error
//!   propagation from the objective.
use std::cell::RefCell;

#[cfg(feature = "obs_slog")]
use argmin::core::observers::ObserverMode;
use argmin::core::{Executor, State};
use ndarray::Array1;
use tracing::debug;

use crate::{
    errors::{MprError, MprResult},
    optimization::{
        adapter::{ArgMinAdapter, Tracker},
        traits::{Bounds, NelderMeadOptions, Objective, OptimOutcome, Optimizer},
        types::{NelderMeadSolver, Theta},
        validation::{verify_maxeval, verify_start},
    },
};

/// Bound-aware, budget-exact Nelder–Mead maximizer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NelderMeadOptimizer {
    options: NelderMeadOptions,
}

impl NelderMeadOptimizer {
    pub fn new(options: NelderMeadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &NelderMeadOptions {
        &self.options
    }

    fn simplex(&self, x0: &[f64], bounds: &Bounds) -> Vec<Theta> {
        let mut start = x0.to_vec();
        bounds.project(&mut start);
        let mut vertices = vec![Array1::from(start.clone())];
        for i in 0..start.len() {
            let step = bounds.width(i).map_or(self.options.initial_step, |w| {
                self.options.initial_step * w
            });
            let mut vertex = start.clone();
            vertex[i] += step;
            if vertex[i] > bounds.upper()[i] {
                vertex[i] = start[i] - step;
            }
            bounds.project(&mut vertex);
            vertices.push(Array1::from(vertex));
        }
        vertices
    }
}

impl Optimizer for NelderMeadOptimizer {
    fn optimize(
        &self, objective: &mut Objective<'_>, bounds: &Bounds, x0: &[f64], maxeval: Option<usize>,
    ) -> MprResult<OptimOutcome> {
        verify_start(x0, bounds)?;
        verify_maxeval(maxeval)?;
        let simplex = self.simplex(x0, bounds);
        let solver =
            NelderMeadSolver::new(simplex.clone()).with_sd_tolerance(self.options.sd_tolerance)?;
        let tracker = RefCell::new(Tracker::default());
        let problem = ArgMinAdapter::new(objective, bounds, maxeval, &tracker);
        let status = match problem.prime(&simplex) {
            Ok(()) => run_nelder_mead(problem, solver, &self.options)?,
            Err(MprError::BudgetExhausted { maxeval }) => budget_status(maxeval),
            Err(err) => return Err(err),
        };
        let tracker = tracker.into_inner();
        let evaluations = tracker.evaluations();
        let best = tracker.best().cloned().ok_or(MprError::NoEvaluatedPoint)?;
        debug!(evaluations, likelihood = best.value, status = %status, "Nelder-Mead finished");
        Ok(OptimOutcome { x_hat: best.x, value: best.value, evaluations, status })
    }

    fn name(&self) -> &'static str {
        "NelderMead"
    }
}

fn budget_status(maxeval: usize) -> String {
    format!("Budget of {maxeval} evaluations spent")
}

/// Run the executor on a primed problem and return a termination reason.
///
/// A spent evaluation budget is reported as a status; every other error
/// propagates.
fn run_nelder_mead(
    problem: ArgMinAdapter<'_, '_>, solver: NelderMeadSolver, opts: &NelderMeadOptions,
) -> MprResult<String> {
    let max_iters = opts.max_iters as u64;
    let mut optimizer = Executor::new(problem, solver);
    optimizer = optimizer.configure(|state| state.max_iters(max_iters));
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        let observer = argmin_observer_slog::SlogLogger::term_noblock();
        optimizer = optimizer.add_observer(observer, ObserverMode::Always);
    }
    let status = match optimizer.run() {
        Ok(result) => format!("{:?}", result.state().get_termination_status()),
        Err(err) => match MprError::from(err) {
            MprError::BudgetExhausted { maxeval } => budget_status(maxeval),
            other => return Err(other),
        },
    };
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn bowl(x: &[f64]) -> MprResult<f64> {
        Ok(-(x[0] - 0.3).powi(2) - (x[1] + 1.0).powi(2))
    }

    #[test]
    // Purpose
    // -------
    // Nelder–Mead finds the maximum of a smooth concave bowl inside the
    // bounds.
    //
    // Given
    // -----
    // - ℓ(x) = -(x₀ - 0.3)² - (x₁ + 1)², bounds [0, 1] × [-2, 2], start at
    //   (0.9, 1.5).
    //
    // Expect
    // ------
    // - x̂ ≈ (0.3, -1.0) and ℓ(x̂) ≈ 0.
    fn finds_interior_maximum() {
        // Arrange
        let options = NelderMeadOptions::new(1_000, 1e-12, 0.2, false).unwrap();
        let optimizer = NelderMeadOptimizer::new(options);
        let bounds = Bounds::new(vec![0.0, -2.0], vec![1.0, 2.0]).unwrap();
        let mut objective = |x: &[f64]| bowl(x);

        // Act
        let outcome = optimizer.optimize(&mut objective, &bounds, &[0.9, 1.5], None).unwrap();

        // Assert
        assert_abs_diff_eq!(outcome.x_hat[0], 0.3, epsilon = 1e-3);
        assert_abs_diff_eq!(outcome.x_hat[1], -1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(outcome.value, 0.0, epsilon = 1e-6);
    }

    #[test]
    // Purpose
    // -------
    // The evaluation budget is exact and never exceeded, and every
    // evaluated point lies inside the box.
    fn budget_is_exact_and_points_stay_in_bounds() {
        let optimizer = NelderMeadOptimizer::default();
        let bounds = Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let mut calls = 0;
        let mut objective = |x: &[f64]| -> MprResult<f64> {
            calls += 1;
            assert!(x.iter().all(|v| (0.0..=1.0).contains(v)));
            Ok(-(x[0] - 0.3).powi(2) - (x[1] - 0.7).powi(2))
        };

        let outcome = optimizer.optimize(&mut objective, &bounds, &[0.9, 0.9], Some(25)).unwrap();

        assert_eq!(calls, 25);
        assert_eq!(outcome.evaluations, 25);
        assert!(outcome.value > -0.4);
    }

    #[test]
    // Purpose
    // -------
    // Likelihood errors abort the search unchanged.
    fn objective_errors_abort() {
        let optimizer = NelderMeadOptimizer::default();
        let bounds = Bounds::new(vec![0.0], vec![1.0]).unwrap();
        let mut objective =
            |_: &[f64]| -> MprResult<f64> { Err(MprError::Likelihood { text: "boom".into() }) };

        let err = optimizer.optimize(&mut objective, &bounds, &[0.5], None).unwrap_err();

        assert_eq!(err, MprError::Likelihood { text: "boom".to_string() });
    }

    #[test]
    // Purpose
    // -------
    // A budget smaller than the initial simplex is a normal termination.
    //
    // Given
    // -----
    // - Two dimensions (three vertices) and budgets of 1 and 2, start at
    //   (0.9, 0.9).
    //
    // Expect
    // ------
    // - `Ok` with exactly `maxeval` evaluations; with one evaluation the
    //   start is the only and best point.
    fn budget_below_simplex_size_returns_best_vertex() {
        let optimizer = NelderMeadOptimizer::default();
        let bounds = Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();

        for maxeval in [1, 2] {
            let mut calls = 0;
            let mut objective = |x: &[f64]| -> MprResult<f64> {
                calls += 1;
                Ok(-(x[0] - 0.3).powi(2) - (x[1] - 0.7).powi(2))
            };

            let outcome =
                optimizer.optimize(&mut objective, &bounds, &[0.9, 0.9], Some(maxeval)).unwrap();

            assert_eq!(calls, maxeval);
            assert_eq!(outcome.evaluations, maxeval);
            assert!(outcome.status.contains("Budget"));
            if maxeval == 1 {
                assert_eq!(outcome.x_hat, vec![0.9, 0.9]);
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // The solver's initial pass does not evaluate the simplex a second
    // time.
    //
    // Given
    // -----
    // - ℓ(x) = -(x₀ - 0.3)² - (x₁ - 0.7)², start (0.5, 0.5), step 0.1, so
    //   the simplex is (0.5, 0.5), (0.6, 0.5), (0.5, 0.6).
    //
    // Expect
    // ------
    // - The first three calls are the vertices and the fourth is a new
    //   point; every call is counted once.
    fn simplex_is_evaluated_once() {
        let optimizer = NelderMeadOptimizer::default();
        let bounds = Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let mut seen: Vec<Vec<f64>> = Vec::new();
        let mut objective = |x: &[f64]| -> MprResult<f64> {
            seen.push(x.to_vec());
            Ok(-(x[0] - 0.3).powi(2) - (x[1] - 0.7).powi(2))
        };

        let outcome = optimizer.optimize(&mut objective, &bounds, &[0.5, 0.5], Some(10)).unwrap();

        assert_eq!(seen.len(), 10);
        assert_eq!(outcome.evaluations, 10);
        assert_eq!(seen[0], vec![0.5, 0.5]);
        assert!(!seen[..3].contains(&seen[3]));
    }
}
