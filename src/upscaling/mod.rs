//! upscaling — grouped aggregation from fine cells to simulation units.
//!
//! Purpose
//! -------
//! Turn the masked output of a regionaliser into one scalar per simulation
//! element, or per `(element, subunit)` pair, with a pluggable reduction.
//!
//! Key behaviors
//! -------------
//! - [`Aggregator`]: the reduction; built-in means (plain and weighted),
//!   `max`, `min`, or a custom closure.
//! - [`Groups`]: sort-and-split grouping of cell indices by key, built once.
//! - [`Upscaler`]: element- or subunit-level; fixes its key set at
//!   activation and overwrites values on every [`Upscaler::scale_up`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Empty groups and groups containing NaN reduce to NaN; upscaling never
//!   raises for data problems.
//! - Results are independent of cell iteration order.
//!
//! Downstream usage
//! ----------------
//! - Transformers read values through element names resolved once at their
//!   own activation ([`Upscaler::element_index`]).
//! - Writers and users read the name-keyed views
//!   ([`Upscaler::name_to_value`], [`Upscaler::name_to_idx_to_value`]).
pub mod aggregators;
pub mod grouping;
pub mod upscaler;

pub use self::aggregators::{Aggregator, CustomAggregator};
pub use self::grouping::Groups;
pub use self::upscaler::{Level, Upscaler};
