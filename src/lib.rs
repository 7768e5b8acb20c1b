//! rust_mpr — multiscale parameter regionalisation.
//!
//! Purpose
//! -------
//! Derive spatially distributed model parameters from fine-resolution
//! geodata through parametric formulas, aggregate them onto the spatial
//! units of a simulation model, write them into its parameters, and
//! calibrate the formulas' free coefficients against a likelihood.
//!
//! Key behaviors
//! -------------
//! - [`provider`]: raster groups and feature collections with element and
//!   subunit ids, plus the reader contract and a per-name cache.
//! - [`regionalisation`]: formulas over provider datasets with mask
//!   propagation, sub-regionalisers publishing their output, and
//!   coefficient-free preprocessors.
//! - [`upscaling`]: grouped, NaN-safe aggregation onto elements or
//!   element/subunit pairs.
//! - [`transforming`] and [`simulation`]: writing upscaled values into the
//!   parameters of the simulation's element graph.
//! - [`task`] and [`calibration`]: the calibration-step primitive, grid
//!   search, and black-box search through [`optimization`].
//! - [`logging`], [`writing`], [`likelihood`], [`manager`]: persisted
//!   calibration logs, result writers, goodness-of-fit criteria, and the
//!   [`manager::Mpr`] composition root.
//!
//! Data flow
//! ---------
//! Provider → Regionaliser (→ mask) → Upscaler → Transformer → Simulation →
//! likelihood → Calibrator (next coefficient vector) → loop.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every component is configured first and `activate`d once; per-trial
//!   work only overwrites values in buffers sized at activation.
//! - Missing samples are never errors: they travel as masks and NaN and
//!   surface as NaN aggregates, which identity transformers skip.
//! - Configuration, likelihood, and I/O errors are fatal and surface as
//!   [`errors::MprError`].
//!
//! Conventions
//! -----------
//! - Coefficient vectors are ordered by coefficient name.
//! - Likelihoods are maximised.
//! - Diagnostics are emitted as `tracing` events; installing a subscriber
//!   is left to the caller.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each module; `tests/integration_mpr_pipeline.rs`
//!   runs a complete setup through [`manager::Mpr`].
pub mod calibration;
pub mod coefficients;
pub mod errors;
pub mod likelihood;
pub mod logging;
pub mod manager;
pub mod optimization;
pub mod provider;
pub mod regionalisation;
pub mod simulation;
pub mod task;
pub mod transforming;
pub mod upscaling;
pub mod writing;

pub mod prelude {
    pub use crate::calibration::{CalibrationOptions, Calibrator, GridSearch, Strategy};
    pub use crate::coefficients::{Coefficient, CoefficientId, CoefficientRegistry};
    pub use crate::errors::{MprError, MprResult};
    pub use crate::logging::{CalibrationLogger, CoefficientLog};
    pub use crate::manager::Mpr;
    pub use crate::optimization::prelude::*;
    pub use crate::provider::{Dataset, IdLayer, InMemorySource, Provider, ProviderSource};
    pub use crate::regionalisation::{Preprocessor, Regionaliser, Subregionaliser};
    pub use crate::simulation::{ElementGraph, ModelNode, Parameter, Simulation};
    pub use crate::task::Task;
    pub use crate::transforming::{ElementTransform, Identity, SubunitTransform, Transformer};
    pub use crate::upscaling::{Aggregator, Upscaler};
    pub use crate::writing::{CoefficientTableWriter, ParameterTableWriter, Writer};
}
