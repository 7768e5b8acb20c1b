//! Errors for the regionalisation → upscaling → calibration pipeline.
//!
//! This module defines the crate-wide error type, [`MprError`], used by
//! providers, equations, upscalers, transformers, the calibrator, loggers,
//! and writers. It implements `Display`/`Error` and absorbs backend errors
//! raised by `argmin`.
//!
//! ## Conventions
//! - **Configuration errors** (missing datasets, shape mismatches, unknown
//!   names) are raised at activation time and are never retried.
//! - **Per-cell data problems** (missing values, NaN) are *not* errors; they
//!   are handled structurally through masks and NaN propagation.
//! - **Likelihood errors** raised by user callbacks propagate unmodified,
//!   also when they travel through the optimizer backend.
//! - **I/O errors** always carry the offending path.
use std::path::Path;

use argmin::core::{ArgminError, Error};

/// Crate-wide result alias for operations that may produce [`MprError`].
pub type MprResult<T> = Result<T, MprError>;

/// Unified error type for multiscale parameter regionalisation.
#[derive(Debug, Clone, PartialEq)]
pub enum MprError {
    // ---- Configuration: providers ----
    /// A provider with the requested name is unknown to the source.
    UnknownProvider { provider: String },

    /// A provider does not contain a dataset requested by an equation.
    MissingDataset { provider: String, dataset: String },

    /// A layer's shape conflicts with the provider's element-id layer.
    ShapeMismatch { provider: String, layer: String, expected: Vec<usize>, found: Vec<usize> },

    /// A provider layer has an unusable layout (e.g. a 3-D raster).
    InvalidLayout { provider: String, reason: &'static str },

    /// A dataset name is already taken inside a provider.
    DatasetExists { provider: String, dataset: String },

    // ---- Configuration: coefficients ----
    /// Two coefficients share one name.
    DuplicateCoefficient { name: String },

    /// A coefficient handle does not belong to the registry.
    UnknownCoefficient { index: usize },

    /// A coefficient name does not belong to the registry.
    UnknownCoefficientName { name: String },

    // ---- Configuration: pipeline wiring ----
    /// A component was used before `activate` was called.
    NotActivated { component: &'static str },

    /// An aggregator name could not be parsed.
    InvalidAggregator { name: String, reason: &'static str },

    /// An optimizer algorithm name could not be parsed.
    InvalidAlgorithm { name: String, reason: &'static str },

    /// An element-level transformer was paired with a subunit-level upscaler
    /// (or vice versa).
    LevelMismatch { transformer: String, expected: &'static str, found: &'static str },

    /// A subunit-level upscaler was bound to a provider without subunit ids.
    MissingSubunits { provider: String },

    /// A subunit id cannot address a position of the target parameter.
    SubunitIndexOutOfRange { element: String, parameter: String, index: i64, len: usize },

    /// The simulation's parameter layout does not support the requested write.
    InvalidParameter { element: String, parameter: String, reason: &'static str },

    // ---- Options ----
    /// Number of grid nodes must be positive.
    InvalidNodes { nmb_nodes: usize, reason: &'static str },

    /// Maximum number of evaluations/iterations must be positive.
    InvalidMaxEval { maxeval: usize, reason: &'static str },

    /// A numerical option must be finite and positive.
    InvalidTolerance { name: &'static str, value: f64, reason: &'static str },

    /// The worker pool could not be created.
    ThreadPool { text: String },

    // ---- Search preconditions ----
    /// Grid search requires finite bounds for every coefficient.
    MissingBound { strategy: &'static str, coefficient: String, side: &'static str },

    /// A coefficient vector has the wrong length.
    ValuesLengthMismatch { expected: usize, found: usize },

    /// No coefficients take part in the calibration.
    NoCoefficients,

    // ---- Likelihood ----
    /// The user-supplied likelihood callback failed.
    Likelihood { text: String },

    /// The simulation collaborator failed.
    Simulation { text: String },

    // ---- I/O ----
    /// Reading or writing a file failed.
    Io { path: String, text: String },

    /// A log file exists and overwriting is not allowed.
    LogExists { path: String },

    /// A log file holds no usable entries.
    CorruptedLog { path: String },

    // ---- Optimizer backend ----
    /// The optimizer spent its evaluation budget.
    BudgetExhausted { maxeval: usize },

    /// A search ended without evaluating a single coefficient vector.
    NoEvaluatedPoint,

    /// Wrapper for argmin errors that did not originate in the objective.
    BackendError { text: String },
}

impl MprError {
    /// Build an [`MprError::Io`] from an `std::io::Error` and the path it
    /// concerns.
    pub fn io(path: &Path, err: std::io::Error) -> Self {
        MprError::Io { path: path.display().to_string(), text: err.to_string() }
    }
}

impl std::error::Error for MprError {}

impl std::fmt::Display for MprError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Configuration: providers ----
            MprError::UnknownProvider { provider } => {
                write!(f, "Provider `{provider}` is unknown to the data source.")
            }
            MprError::MissingDataset { provider, dataset } => {
                write!(f, "Provider `{provider}` does not contain a dataset named `{dataset}`.")
            }
            MprError::ShapeMismatch { provider, layer, expected, found } => {
                write!(
                    f,
                    "Provider `{provider}` is inconsistent: shape {expected:?} of the element \
                     id layer conflicts with shape {found:?} of layer `{layer}`."
                )
            }
            MprError::InvalidLayout { provider, reason } => {
                write!(f, "Provider `{provider}` has an invalid layout: {reason}")
            }
            MprError::DatasetExists { provider, dataset } => {
                write!(f, "Provider `{provider}` already contains a dataset named `{dataset}`.")
            }

            // ---- Configuration: coefficients ----
            MprError::DuplicateCoefficient { name } => {
                write!(f, "Coefficient `{name}` is registered more than once.")
            }
            MprError::UnknownCoefficient { index } => {
                write!(f, "Coefficient handle {index} does not belong to the registry.")
            }
            MprError::UnknownCoefficientName { name } => {
                write!(f, "Coefficient `{name}` does not belong to the registry.")
            }

            // ---- Configuration: pipeline wiring ----
            MprError::NotActivated { component } => {
                write!(f, "{component} must be activated before use.")
            }
            MprError::InvalidAggregator { name, reason } => {
                write!(f, "Invalid aggregator '{name}': {reason}")
            }
            MprError::InvalidAlgorithm { name, reason } => {
                write!(f, "Invalid optimizer algorithm '{name}': {reason}")
            }
            MprError::LevelMismatch { transformer, expected, found } => {
                write!(
                    f,
                    "Transformer for parameter `{transformer}` works on {expected} level but \
                     its upscaler works on {found} level."
                )
            }
            MprError::MissingSubunits { provider } => {
                write!(f, "Provider `{provider}` does not define subunit ids.")
            }
            MprError::SubunitIndexOutOfRange { element, parameter, index, len } => {
                write!(
                    f,
                    "Subunit id {index} of element `{element}` cannot address parameter \
                     `{parameter}`, which has {len} values."
                )
            }
            MprError::InvalidParameter { element, parameter, reason } => {
                write!(f, "Parameter `{parameter}` of element `{element}`: {reason}")
            }

            // ---- Options ----
            MprError::InvalidNodes { nmb_nodes, reason } => {
                write!(f, "Invalid number of grid nodes {nmb_nodes}: {reason}")
            }
            MprError::InvalidMaxEval { maxeval, reason } => {
                write!(f, "Invalid evaluation budget {maxeval}: {reason}")
            }
            MprError::InvalidTolerance { name, value, reason } => {
                write!(f, "Invalid {name} {value}: {reason}")
            }
            MprError::ThreadPool { text } => {
                write!(f, "Worker pool could not be built: {text}")
            }

            // ---- Search preconditions ----
            MprError::MissingBound { strategy, coefficient, side } => {
                write!(
                    f,
                    "Class `{strategy}` requires lower and upper bounds for all coefficients, \
                     but coefficient `{coefficient}` defines no {side} bound."
                )
            }
            MprError::ValuesLengthMismatch { expected, found } => {
                write!(f, "Coefficient vector length mismatch: expected {expected}, found {found}")
            }
            MprError::NoCoefficients => {
                write!(f, "No coefficients take part in the calibration.")
            }

            // ---- Likelihood ----
            MprError::Likelihood { text } => {
                write!(f, "Likelihood calculation failed: {text}")
            }
            MprError::Simulation { text } => {
                write!(f, "Simulation failed: {text}")
            }

            // ---- I/O ----
            MprError::Io { path, text } => {
                write!(f, "I/O error for `{path}`: {text}")
            }
            MprError::LogExists { path } => {
                write!(f, "Overwriting the already existing log file `{path}` is not allowed.")
            }
            MprError::CorruptedLog { path } => {
                write!(f, "The log file `{path}` is empty or corrupted.")
            }

            // ---- Optimizer backend ----
            MprError::BudgetExhausted { maxeval } => {
                write!(f, "Evaluation budget of {maxeval} objective calls exhausted")
            }
            MprError::NoEvaluatedPoint => {
                write!(f, "Search finished without an evaluated coefficient vector")
            }
            MprError::BackendError { text } => {
                write!(f, "Backend error: {text}")
            }
        }
    }
}

impl From<Error> for MprError {
    fn from(original_err: Error) -> Self {
        let original_err = match original_err.downcast::<MprError>() {
            Ok(mpr_err) => return mpr_err,
            Err(err) => err,
        };
        match original_err.downcast::<ArgminError>() {
            Ok(argmin_err) => MprError::BackendError { text: argmin_err.to_string() },
            Err(err) => MprError::BackendError { text: err.to_string() },
        }
    }
}
