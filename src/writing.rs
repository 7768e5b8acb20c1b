//! writing — persist the outcome of a calibration.
//!
//! Writers are activated together with the calibrator and invoked once
//! after [`Calibrator::calibrate`]. Two tab-separated writers are provided:
//!
//! - [`CoefficientTableWriter`]: one row per coefficient,
//!   `name lower upper default value`.
//! - [`ParameterTableWriter`]: re-applies the calibrated coefficients and
//!   writes every parameter a transformer targets,
//!   `element parameter value1 value2 ...`.
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::info;

use crate::{
    calibration::Calibrator,
    errors::{MprError, MprResult},
    simulation::Simulation,
};

/// Output stage run after the calibration.
pub trait Writer<S: Simulation> {
    /// Prepare the target; called once the calibrator is activated.
    fn activate(&mut self, calibrator: &Calibrator<S>) -> MprResult<()>;

    fn write(&mut self, calibrator: &mut Calibrator<S>) -> MprResult<()>;
}

fn prepare(path: &Path) -> MprResult<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => fs::create_dir_all(parent).map_err(|err| MprError::io(parent, err)),
        None => Ok(()),
    }
}

fn join(fields: impl IntoIterator<Item = String>) -> String {
    fields.into_iter().collect::<Vec<_>>().join("\t")
}

/// Table of the calibrated coefficients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoefficientTableWriter {
    path: PathBuf,
}

impl CoefficientTableWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<S: Simulation> Writer<S> for CoefficientTableWriter {
    fn activate(&mut self, _calibrator: &Calibrator<S>) -> MprResult<()> {
        prepare(&self.path)
    }

    fn write(&mut self, calibrator: &mut Calibrator<S>) -> MprResult<()> {
        let mut text = String::from("name\tlower\tupper\tdefault\tvalue\n");
        for &id in calibrator.coefficient_ids() {
            let c = calibrator.registry().get(id)?;
            let row = [c.lower(), c.upper(), c.default(), c.value()].map(|v| v.to_string());
            text.push_str(&join(std::iter::once(c.name().to_string()).chain(row)));
            text.push('\n');
        }
        fs::write(&self.path, text).map_err(|err| MprError::io(&self.path, err))?;
        info!(path = %self.path.display(), "coefficient table written");
        Ok(())
    }
}

/// Table of all transformer-targeted simulation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterTableWriter {
    path: PathBuf,
}

impl ParameterTableWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<S: Simulation> Writer<S> for ParameterTableWriter {
    fn activate(&mut self, _calibrator: &Calibrator<S>) -> MprResult<()> {
        prepare(&self.path)
    }

    fn write(&mut self, calibrator: &mut Calibrator<S>) -> MprResult<()> {
        let values = calibrator.values();
        calibrator.apply_values(&values)?;
        let graph = calibrator.simulation().elements();
        let mut rows = BTreeMap::new();
        for transformer in calibrator.tasks().iter().flat_map(|t| t.transformers()) {
            for (element, path) in transformer.targets() {
                let parameter = graph.parameter(element, path, transformer.parameter())?;
                rows.insert((element, transformer.parameter()), parameter.values());
            }
        }
        let mut text = String::from("element\tparameter\tvalues\n");
        for ((element, name), values) in rows {
            let fields = [element.to_string(), name.to_string()]
                .into_iter()
                .chain(values.iter().map(f64::to_string));
            text.push_str(&join(fields));
            text.push('\n');
        }
        fs::write(&self.path, text).map_err(|err| MprError::io(&self.path, err))?;
        info!(path = %self.path.display(), "parameter table written");
        Ok(())
    }
}
