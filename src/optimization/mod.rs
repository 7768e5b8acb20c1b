//! optimization — black-box maximization of calibration likelihoods.
//!
//! Purpose
//! -------
//! Provide the strategy interface the calibrator delegates black-box
//! search to, plus an Argmin-backed Nelder–Mead implementation. Callers
//! hand over a likelihood callback, box bounds, a start vector and an
//! optional evaluation budget, and get back the best point evaluated.
//!
//! Key behaviors
//! -------------
//! - [`Optimizer`] is object-safe, so any derivative-free backend can be
//!   injected into a calibrator as `Arc<dyn Optimizer>`.
//! - [`NelderMeadOptimizer`] wraps argmin's Nelder–Mead solver through
//!   [`adapter::ArgMinAdapter`], which projects candidates into the
//!   bounds, enforces the budget exactly and tracks the incumbent.
//! - [`Algorithm`] selects a backend by name (`FromStr`).
//!
//! Invariants & assumptions
//! ------------------------
//! - Objectives are only ever evaluated inside the bounds.
//! - Exhausting `maxeval` is a normal termination; the best evaluated
//!   point is returned.
//! - Errors raised by the objective propagate unchanged through the
//!   backend.
//!
//! Conventions
//! -----------
//! - Likelihoods are maximized; the adapter minimizes `c(x) = -ℓ(x)`.
//! - Vectors follow the calibrator's name-sorted coefficient order.
//!
//! Testing notes
//! -------------
//! - `adapter`: sign flip, projection, budget and error propagation.
//! - `nelder_mead`: convergence on a concave bowl and exact budgets.
//! - `traits`/`validation`: option parsing and validation.
pub mod adapter;
pub mod nelder_mead;
pub mod traits;
pub mod types;
pub mod validation;

pub use self::nelder_mead::NelderMeadOptimizer;
pub use self::traits::{Algorithm, Bounds, NelderMeadOptions, Objective, OptimOutcome, Optimizer};
pub use self::types::{Cost, Theta};

pub mod prelude {
    pub use super::nelder_mead::NelderMeadOptimizer;
    pub use super::traits::{Algorithm, Bounds, NelderMeadOptions, OptimOutcome, Optimizer};
}
