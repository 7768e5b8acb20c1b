//! Equations whose output becomes a provider dataset.
//!
//! - [`Subregionaliser`] publishes its *live* output: consumers bound to the
//!   published dataset see the values of the current calibration trial, so
//!   it must be re-evaluated before any dependent task runs.
//! - [`Preprocessor`] has no coefficients; it is evaluated once at
//!   activation and publishes a snapshot.
//!
//! Neither applies its mask to the published values. A subregionaliser
//! publishes the mask of its own inputs, a preprocessor the NaN pattern of
//! its output.
use std::sync::RwLockReadGuard;

use ndarray::ArrayD;
use tracing::debug;

use crate::{
    coefficients::{CoefficientId, CoefficientRegistry},
    errors::MprResult,
    provider::{Dataset, Provider},
    regionalisation::equation::{Inputs, Regionaliser},
};

/// Regionaliser publishing its raw output as dataset `name`.
#[derive(Debug)]
pub struct Subregionaliser {
    inner: Regionaliser,
}

impl Subregionaliser {
    /// Declare a subregionaliser; `name` doubles as the published dataset
    /// name.
    pub fn new<F>(
        name: impl Into<String>, source: impl Into<String>, inputs: &[(&str, &str)],
        coefficients: &[CoefficientId], formula: F,
    ) -> Self
    where
        F: Fn(&Inputs<'_>, &[f64], &mut ArrayD<f64>) + Send + Sync + 'static,
    {
        Self { inner: Regionaliser::new(name, source, inputs, coefficients, formula) }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn source(&self) -> &str {
        self.inner.source()
    }

    pub fn coefficients(&self) -> &[CoefficientId] {
        self.inner.coefficients()
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.inner.dataset_names()
    }

    /// Bind inputs and publish the shared output under [`Self::name`].
    ///
    /// # Errors
    /// - Any activation error of the wrapped regionaliser.
    /// - [`crate::errors::MprError::DatasetExists`] if the name is taken.
    pub fn activate(&mut self, provider: &mut Provider) -> MprResult<()> {
        self.inner.activate(provider)?;
        let dataset = Dataset::shared(self.inner.output_handle(), self.inner.mask().clone());
        provider.publish(self.inner.name(), dataset)?;
        debug!(subregionaliser = self.inner.name(), "output published");
        Ok(())
    }

    /// Re-evaluate the published values; no masking.
    pub fn apply_coefficients(&self, registry: &CoefficientRegistry) -> MprResult<()> {
        self.inner.apply_coefficients(registry)
    }

    pub fn mask(&self) -> &ArrayD<bool> {
        self.inner.mask()
    }

    pub fn output(&self) -> RwLockReadGuard<'_, ArrayD<f64>> {
        self.inner.output()
    }
}

/// Coefficient-free equation evaluated once and published as a snapshot.
#[derive(Debug)]
pub struct Preprocessor {
    inner: Regionaliser,
}

impl Preprocessor {
    pub fn new<F>(
        name: impl Into<String>, source: impl Into<String>, inputs: &[(&str, &str)], formula: F,
    ) -> Self
    where
        F: Fn(&Inputs<'_>, &[f64], &mut ArrayD<f64>) + Send + Sync + 'static,
    {
        Self { inner: Regionaliser::new(name, source, inputs, &[], formula) }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn source(&self) -> &str {
        self.inner.source()
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.inner.dataset_names()
    }

    /// Evaluate once and publish the result as a float dataset.
    pub fn activate(&mut self, provider: &mut Provider) -> MprResult<()> {
        self.inner.activate(provider)?;
        self.inner.apply_coefficients(&CoefficientRegistry::new())?;
        let snapshot = self.inner.output().clone();
        provider.publish(self.inner.name(), Dataset::float(snapshot))?;
        debug!(preprocessor = self.inner.name(), "output published");
        Ok(())
    }
}
