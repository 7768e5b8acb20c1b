//! coefficients — named, bounded free parameters of regionalisation formulas.
//!
//! Purpose
//! -------
//! Own every [`Coefficient`] of a regionalisation setup in one arena, the
//! [`CoefficientRegistry`], and hand out stable integer handles
//! ([`CoefficientId`]) to the formulas that use them. Sharing a handle
//! between several formulas shares the coefficient; deduplication across
//! tasks is therefore a matter of comparing handles.
//!
//! Key behaviors
//! -------------
//! - [`CoefficientRegistry::register`] rejects a second coefficient with an
//!   already used name; [`CoefficientRegistry::id`] finds a handle by name.
//! - [`CoefficientRegistry::sorted_ids`] returns a deduplicated, name-sorted
//!   handle list. The calibrator addresses coefficients positionally through
//!   this ordering.
//! - Only [`CoefficientRegistry::assign`] mutates values; regionalisers
//!   receive a shared borrow of the registry during a calibration step.
//!
//! Invariants & assumptions
//! ------------------------
//! - Names are unique within one registry.
//! - `default` is fixed at construction and `value` starts at `default`.
//! - `lower ≤ value ≤ upper` is intended but not enforced: assigning a value
//!   outside the bounds keeps it unchanged (no clamping), because optimizers
//!   may probe outside the box.
use std::collections::BTreeSet;

use crate::errors::{MprError, MprResult};

/// Stable handle of a [`Coefficient`] inside a [`CoefficientRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoefficientId(pub(crate) usize);

impl CoefficientId {
    /// Position of the coefficient inside its registry.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named, bounded, mutable scalar of a regionalisation formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficient {
    name: String,
    default: f64,
    lower: f64,
    upper: f64,
    value: f64,
}

impl Coefficient {
    /// Unbounded coefficient starting at `default`.
    pub fn new(name: impl Into<String>, default: f64) -> Self {
        Self {
            name: name.into(),
            default,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
            value: default,
        }
    }

    /// Coefficient restricted to `[lower, upper]`, starting at `default`.
    pub fn bounded(name: impl Into<String>, default: f64, lower: f64, upper: f64) -> Self {
        Self { lower, upper, ..Self::new(name, default) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> f64 {
        self.default
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_lower(&mut self, lower: f64) {
        self.lower = lower;
    }

    pub fn set_upper(&mut self, upper: f64) {
        self.upper = upper;
    }
}

/// Arena owning all coefficients of one regionalisation setup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoefficientRegistry {
    coefficients: Vec<Coefficient>,
}

impl CoefficientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a coefficient and return its handle.
    ///
    /// # Errors
    /// - [`MprError::DuplicateCoefficient`] if the name is already taken.
    pub fn register(&mut self, coefficient: Coefficient) -> MprResult<CoefficientId> {
        if self.coefficients.iter().any(|c| c.name == coefficient.name) {
            return Err(MprError::DuplicateCoefficient { name: coefficient.name });
        }
        self.coefficients.push(coefficient);
        Ok(CoefficientId(self.coefficients.len() - 1))
    }

    /// Handle of the coefficient called `name`.
    pub fn id(&self, name: &str) -> MprResult<CoefficientId> {
        self.coefficients
            .iter()
            .position(|c| c.name == name)
            .map(CoefficientId)
            .ok_or_else(|| MprError::UnknownCoefficientName { name: name.to_string() })
    }

    pub fn get(&self, id: CoefficientId) -> MprResult<&Coefficient> {
        self.coefficients.get(id.0).ok_or(MprError::UnknownCoefficient { index: id.0 })
    }

    pub fn get_mut(&mut self, id: CoefficientId) -> MprResult<&mut Coefficient> {
        self.coefficients.get_mut(id.0).ok_or(MprError::UnknownCoefficient { index: id.0 })
    }

    /// Current value of the coefficient behind `id`.
    pub fn value(&self, id: CoefficientId) -> MprResult<f64> {
        Ok(self.get(id)?.value)
    }

    /// Values for `ids`, in the order given.
    pub fn values(&self, ids: &[CoefficientId]) -> MprResult<Vec<f64>> {
        ids.iter().map(|&id| self.value(id)).collect()
    }

    /// Write `values` positionally into the coefficients behind `ids`.
    ///
    /// No clamping to `[lower, upper]` takes place.
    ///
    /// # Errors
    /// - [`MprError::ValuesLengthMismatch`] if the lengths differ.
    /// - [`MprError::UnknownCoefficient`] for foreign handles.
    pub fn assign(&mut self, ids: &[CoefficientId], values: &[f64]) -> MprResult<()> {
        if ids.len() != values.len() {
            return Err(MprError::ValuesLengthMismatch { expected: ids.len(), found: values.len() });
        }
        for (&id, &value) in ids.iter().zip(values) {
            self.get_mut(id)?.value = value;
        }
        Ok(())
    }

    /// Deduplicate `ids` and sort them by coefficient name.
    pub fn sorted_ids<I>(&self, ids: I) -> MprResult<Vec<CoefficientId>>
    where
        I: IntoIterator<Item = CoefficientId>,
    {
        let unique: BTreeSet<CoefficientId> = ids.into_iter().collect();
        let mut named = unique
            .into_iter()
            .map(|id| Ok((self.get(id)?.name.as_str(), id)))
            .collect::<MprResult<Vec<_>>>()?;
        named.sort_by(|a, b| a.0.cmp(b.0));
        Ok(named.into_iter().map(|(_, id)| id).collect())
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CoefficientId, &Coefficient)> {
        self.coefficients.iter().enumerate().map(|(i, c)| (CoefficientId(i), c))
    }
}
