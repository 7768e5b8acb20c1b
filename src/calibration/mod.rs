//! calibration — search for the coefficient vector maximising a likelihood.
//!
//! Purpose
//! -------
//! Tie the pipeline together: a [`Calibrator`] owns the coefficient
//! registry, the tasks, the sub-regionalisers and the simulation, exposes
//! the single re-evaluation primitive
//! [`Calibrator::perform_calibrationstep`], and runs one of two
//! [`Strategy`] variants over it.
//!
//! Key behaviors
//! -------------
//! - [`GridSearch`]: exhaustive evaluation of a Cartesian grid inside the
//!   coefficient bounds (bounds are mandatory).
//! - `Strategy::Optimizer`: delegation to any
//!   [`crate::optimization::Optimizer`], with the step as objective.
//! - Both strategies end with one extra step at the best vector.
//!
//! Conventions
//! -----------
//! - Vectors are ordered by coefficient name; see
//!   [`Calibrator::names`].
//! - Likelihoods are maximised.
//!
//! Testing notes
//! -------------
//! - `grid`: node placement, product order, preconditions.
//! - `calibrator`: round trip of a step, condition restoring, step counts
//!   of both strategies, sequential vs. pooled tasks.
pub mod calibrator;
pub mod grid;

pub use self::calibrator::{CalibrationOptions, Calibrator, LikelihoodFn, Strategy};
pub use self::grid::{GridPoints, GridSearch};
