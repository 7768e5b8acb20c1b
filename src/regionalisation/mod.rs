//! regionalisation — formulas turning geodata into parameter fields.
//!
//! Purpose
//! -------
//! Derive spatially distributed parameter fields from provider datasets
//! through coefficient-weighted formulas, and track which cells of each
//! field are valid.
//!
//! Key behaviors
//! -------------
//! - [`Regionaliser`]: explicit input binding, mask = AND of input masks,
//!   separate evaluation and masking steps.
//! - [`Subregionaliser`]: publishes its live output back into the provider
//!   so other regionalisers can consume it; must run before its consumers
//!   on every trial.
//! - [`Preprocessor`]: coefficient-free, evaluated once at activation.
//!
//! Conventions
//! -----------
//! - Formulas are closures `(inputs, coefficient values, output)`; inputs
//!   are addressed by the input names declared at construction and
//!   coefficient values arrive in declaration order.
//! - Missing values are NaN throughout; masking never raises.
pub mod derived;
pub mod equation;

pub use self::derived::{Preprocessor, Subregionaliser};
pub use self::equation::{FormulaFn, Inputs, Regionaliser};
