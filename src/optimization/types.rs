//! optimization::types — numeric aliases and solver wiring.
//!
//! Purpose
//! -------
//! Keep the `ndarray`/Argmin generics in one place so the rest of the
//! optimization code only speaks in terms of [`Theta`] and [`Cost`].
//!
//! Conventions
//! -----------
//! - `Cost` is the minimized quantity `c(θ) = -ℓ(θ)`; the adapter performs
//!   the sign flip.
//! - This module defines no runtime behavior; there are no dedicated unit
//!   tests.
use argmin::solver::neldermead::NelderMead;
use ndarray::Array1;

/// Coefficient vector in the calibrator's name-sorted order.
pub type Theta = Array1<f64>;

/// Scalar objective value seen by the solver.
pub type Cost = f64;

/// Nelder–Mead specialized to this crate's numeric types.
pub type NelderMeadSolver = NelderMead<Theta, Cost>;
