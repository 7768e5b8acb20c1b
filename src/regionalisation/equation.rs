//! Regionaliser — binds provider datasets to a coefficient-weighted formula.
//!
//! Purpose
//! -------
//! Evaluate a user formula over aligned input layers into an output array of
//! the provider's shape, and keep the validity mask that says which cells of
//! that output are meaningful.
//!
//! Key behaviors
//! -------------
//! - Inputs are declared explicitly as `(input_name, dataset_name)` pairs at
//!   construction; [`Regionaliser::activate`] resolves them against a
//!   provider, ANDs their masks into `mask` (starting from all-true) and
//!   fills `output` with NaN.
//! - [`Regionaliser::apply_coefficients`] reads the current coefficient
//!   values from the registry, in declaration order, and lets the formula
//!   overwrite `output` completely.
//! - [`Regionaliser::apply_mask`] sets `output[!mask] = NaN`; it is
//!   idempotent and kept separate from evaluation so that derived
//!   equations can skip it.
//!
//! Invariants & assumptions
//! ------------------------
//! - After activation `mask` equals the AND of all bound input masks and
//!   has the provider's shape.
//! - Formulas are element-wise and must overwrite every cell of `output`;
//!   no partial updates are assumed.
//! - Evaluation takes `&self`: the output lives behind its own lock, which
//!   lets independent regionalisers run on separate worker threads.
use std::{fmt, ops::Index, sync::RwLockReadGuard};

use ndarray::{ArrayD, IxDyn, Zip};
use tracing::debug;

use crate::{
    coefficients::{CoefficientId, CoefficientRegistry},
    errors::{MprError, MprResult},
    provider::{Provider, SharedArray, read_shared, write_shared},
};

/// Boxed formula: `(inputs, coefficient values, output)`.
pub type FormulaFn = Box<dyn Fn(&Inputs<'_>, &[f64], &mut ArrayD<f64>) + Send + Sync>;

/// Read access to the bound input layers of one evaluation, by input name.
pub struct Inputs<'a> {
    names: Vec<&'a str>,
    arrays: Vec<RwLockReadGuard<'a, ArrayD<f64>>>,
}

impl<'a> Inputs<'a> {
    /// Input layer called `name`, if declared.
    pub fn get(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.names.iter().position(|&n| n == name).map(|i| &*self.arrays[i])
    }

    pub fn names(&self) -> &[&'a str] {
        &self.names
    }
}

impl Index<&str> for Inputs<'_> {
    type Output = ArrayD<f64>;

    /// Panics if `name` was not declared as an input.
    fn index(&self, name: &str) -> &ArrayD<f64> {
        match self.get(name) {
            Some(array) => array,
            None => panic!("input `{name}` is not declared by this regionaliser"),
        }
    }
}

/// A named formula over provider datasets and coefficients.
pub struct Regionaliser {
    name: String,
    source: String,
    inputs: Vec<(String, String)>,
    coefficients: Vec<CoefficientId>,
    formula: FormulaFn,
    bound: Vec<SharedArray>,
    mask: ArrayD<bool>,
    output: SharedArray,
    activated: bool,
}

impl fmt::Debug for Regionaliser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Regionaliser")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("inputs", &self.inputs)
            .field("coefficients", &self.coefficients)
            .field("activated", &self.activated)
            .finish()
    }
}

impl Regionaliser {
    /// Declare a regionaliser.
    ///
    /// - `source`: name of the provider to bind against.
    /// - `inputs`: `(input_name, dataset_name)` pairs; the formula addresses
    ///   layers by `input_name`.
    /// - `coefficients`: handles whose values reach the formula in this order.
    pub fn new<F>(
        name: impl Into<String>, source: impl Into<String>, inputs: &[(&str, &str)],
        coefficients: &[CoefficientId], formula: F,
    ) -> Self
    where
        F: Fn(&Inputs<'_>, &[f64], &mut ArrayD<f64>) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            source: source.into(),
            inputs: inputs.iter().map(|&(i, d)| (i.to_string(), d.to_string())).collect(),
            coefficients: coefficients.to_vec(),
            formula: Box::new(formula),
            bound: Vec::new(),
            mask: ArrayD::from_elem(IxDyn(&[0]), false),
            output: SharedArray::default(),
            activated: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn coefficients(&self) -> &[CoefficientId] {
        &self.coefficients
    }

    /// Provider dataset names this regionaliser reads.
    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|(_, d)| d.as_str())
    }

    /// Bind inputs, compute the mask, and allocate a NaN output.
    ///
    /// # Errors
    /// - [`MprError::MissingDataset`] if a declared dataset is absent.
    pub fn activate(&mut self, provider: &Provider) -> MprResult<()> {
        let shape = IxDyn(&provider.shape());
        let mut mask = ArrayD::from_elem(shape.clone(), true);
        let mut bound = Vec::with_capacity(self.inputs.len());
        for (_, dataset_name) in &self.inputs {
            let dataset = provider.dataset(dataset_name)?;
            Zip::from(&mut mask).and(dataset.mask()).for_each(|m, &d| *m &= d);
            bound.push(dataset.values());
        }
        self.mask = mask;
        self.bound = bound;
        *write_shared(&self.output) = ArrayD::from_elem(shape, f64::NAN);
        self.activated = true;
        debug!(
            regionaliser = %self.name,
            provider = provider.name(),
            valid = self.mask.iter().filter(|&&m| m).count(),
            "regionaliser activated"
        );
        Ok(())
    }

    /// Evaluate the formula with the current coefficient values.
    ///
    /// # Errors
    /// - [`MprError::NotActivated`] before [`Regionaliser::activate`].
    /// - [`MprError::UnknownCoefficient`] for foreign handles.
    pub fn apply_coefficients(&self, registry: &CoefficientRegistry) -> MprResult<()> {
        if !self.activated {
            return Err(MprError::NotActivated { component: "Regionaliser" });
        }
        let values = registry.values(&self.coefficients)?;
        let inputs = Inputs {
            names: self.inputs.iter().map(|(i, _)| i.as_str()).collect(),
            arrays: self.bound.iter().map(read_shared).collect(),
        };
        let mut output = write_shared(&self.output);
        (self.formula)(&inputs, &values, &mut *output);
        Ok(())
    }

    /// Overwrite every cell outside the mask with NaN.
    pub fn apply_mask(&self) {
        let mut output = write_shared(&self.output);
        Zip::from(&mut *output).and(&self.mask).for_each(|o, &m| {
            if !m {
                *o = f64::NAN;
            }
        });
    }

    pub fn mask(&self) -> &ArrayD<bool> {
        &self.mask
    }

    /// Read access to the current output.
    pub fn output(&self) -> RwLockReadGuard<'_, ArrayD<f64>> {
        read_shared(&self.output)
    }

    /// Shared handle to the output, for publishing.
    pub fn output_handle(&self) -> SharedArray {
        SharedArray::clone(&self.output)
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }
}
