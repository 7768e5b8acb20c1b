//! manager — composition root of one regionalisation setup.
//!
//! Purpose
//! -------
//! [`Mpr`] wires the reader, the preprocessors, the calibrator (with its
//! sub-regionalisers and tasks) and the writers together and enforces the
//! activation order the pipeline depends on.
//!
//! Key behaviors
//! -------------
//! - [`Mpr::activate`] scans every equation for the datasets it reads,
//!   loads each referenced provider once with exactly those datasets
//!   (minus those published later by preprocessors and
//!   sub-regionalisers), then activates preprocessors → sub-regionalisers →
//!   tasks → calibrator state → writers.
//! - [`Mpr::run`] calibrates and hands the result to every writer.
//!
//! Invariants & assumptions
//! ------------------------
//! - A preprocessor or sub-regionaliser that feeds another equation is
//!   declared before that equation.
use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::{
    calibration::Calibrator,
    errors::{MprError, MprResult},
    provider::{ProviderCache, ProviderSource},
    regionalisation::Preprocessor,
    simulation::Simulation,
    writing::Writer,
};

fn require<'a>(
    requirements: &mut BTreeMap<String, BTreeSet<String>>, published: &BTreeSet<(String, String)>,
    source: &str, datasets: impl Iterator<Item = &'a str>,
) {
    let entry = requirements.entry(source.to_string()).or_default();
    for dataset in datasets {
        if !published.contains(&(source.to_string(), dataset.to_string())) {
            entry.insert(dataset.to_string());
        }
    }
}

pub struct Mpr<S: Simulation> {
    source: Box<dyn ProviderSource>,
    cache: ProviderCache,
    preprocessors: Vec<Preprocessor>,
    calibrator: Calibrator<S>,
    writers: Vec<Box<dyn Writer<S>>>,
    activated: bool,
}

impl<S: Simulation> Mpr<S> {
    pub fn new(source: impl ProviderSource + 'static, calibrator: Calibrator<S>) -> Self {
        Self {
            source: Box::new(source),
            cache: ProviderCache::new(),
            preprocessors: Vec::new(),
            calibrator,
            writers: Vec::new(),
            activated: false,
        }
    }

    /// Preprocessors are evaluated in the order they are added.
    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessors.push(preprocessor);
        self
    }

    pub fn with_writer(mut self, writer: impl Writer<S> + 'static) -> Self {
        self.writers.push(Box::new(writer));
        self
    }

    /// Provider name → datasets to read from the source.
    pub fn requirements(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut published = BTreeSet::new();
        let mut requirements = BTreeMap::new();
        for preprocessor in &self.preprocessors {
            require(&mut requirements, &published, preprocessor.source(), preprocessor.dataset_names());
            published.insert((preprocessor.source().to_string(), preprocessor.name().to_string()));
        }
        for subregionaliser in self.calibrator.subregionalisers() {
            require(
                &mut requirements,
                &published,
                subregionaliser.source(),
                subregionaliser.dataset_names(),
            );
            published.insert((subregionaliser.source().to_string(), subregionaliser.name().to_string()));
        }
        for task in self.calibrator.tasks() {
            require(&mut requirements, &published, task.source(), task.regionaliser().dataset_names());
        }
        requirements
    }

    /// Load providers and activate every component in dependency order.
    ///
    /// # Errors
    /// - Reader errors ([`MprError::UnknownProvider`],
    ///   [`MprError::MissingDataset`], [`MprError::Io`]).
    /// - Every activation error of the components.
    pub fn activate(&mut self) -> MprResult<()> {
        let requirements = self.requirements();
        self.cache.load_all(self.source.as_ref(), &requirements)?;
        for preprocessor in &mut self.preprocessors {
            let provider = self.cache.get_mut(preprocessor.source())?;
            preprocessor.activate(provider)?;
        }
        self.calibrator.activate(&mut self.cache)?;
        for writer in &mut self.writers {
            writer.activate(&self.calibrator)?;
        }
        self.activated = true;
        info!(
            providers = self.cache.len(),
            preprocessors = self.preprocessors.len(),
            writers = self.writers.len(),
            "regionalisation setup activated"
        );
        Ok(())
    }

    /// Calibrate, then run every writer; returns the final likelihood.
    ///
    /// # Errors
    /// - [`MprError::NotActivated`] before [`Mpr::activate`].
    /// - Every calibration and writer error.
    pub fn run(&mut self) -> MprResult<f64> {
        if !self.activated {
            return Err(MprError::NotActivated { component: "Mpr" });
        }
        let likelihood = self.calibrator.calibrate()?;
        for writer in &mut self.writers {
            writer.write(&mut self.calibrator)?;
        }
        info!(likelihood, steps = self.calibrator.nmb_steps(), "regionalisation run finished");
        Ok(likelihood)
    }

    pub fn calibrator(&self) -> &Calibrator<S> {
        &self.calibrator
    }

    pub fn calibrator_mut(&mut self) -> &mut Calibrator<S> {
        &mut self.calibrator
    }

    pub fn providers(&self) -> &ProviderCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calibration::{
            Strategy,
            calibrator::tests::{Toy, toy_calibrator},
        },
        coefficients::{Coefficient, CoefficientRegistry},
        provider::{Dataset, IdLayer, InMemorySource, Provider},
        regionalisation::{Regionaliser, Subregionaliser},
        task::Task,
        upscaling::{Aggregator, Upscaler},
    };
    use ndarray::arr2;

    fn source() -> InMemorySource {
        let ids = IdLayer::new(arr2(&[[1, 1], [2, 2]]).into_dyn(), -1);
        let names = BTreeMap::from([(1, "land_a".to_string()), (2, "land_b".to_string())]);
        let provider = Provider::raster("raster", ids, names)
            .unwrap()
            .with_dataset("clay", Dataset::float(arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn()))
            .unwrap()
            .with_dataset("sand", Dataset::float(arr2(&[[4.0, 3.0], [2.0, 1.0]]).into_dyn()))
            .unwrap();
        InMemorySource::new().with_provider(provider)
    }

    #[test]
    // Purpose
    // -------
    // Datasets published by preprocessors and sub-regionalisers are not
    // requested from the reader.
    //
    // Given
    // -----
    // - A preprocessor `texture` (reads clay, sand), a sub-regionaliser
    //   `porosity` (reads texture) and a task reading porosity and clay.
    //
    // Expect
    // ------
    // - The reader is asked for `raster` with {clay, sand} only, and the
    //   whole setup activates.
    fn requirements_exclude_published_datasets() {
        // Arrange
        let mut registry = CoefficientRegistry::new();
        let p = registry.register(Coefficient::bounded("p", 0.5, 0.0, 1.0)).unwrap();
        let k = registry.register(Coefficient::bounded("k", 1.0, 0.0, 2.0)).unwrap();
        let preprocessor =
            Preprocessor::new("texture", "raster", &[("clay", "clay"), ("sand", "sand")], |x, _, out| {
                out.assign(&(&x["clay"] / &(&x["clay"] + &x["sand"])))
            });
        let subregionaliser =
            Subregionaliser::new("porosity", "raster", &[("texture", "texture")], &[p], |x, c, out| {
                out.assign(&(&x["texture"] * c[0]))
            });
        let regionaliser = Regionaliser::new(
            "fc",
            "raster",
            &[("porosity", "porosity"), ("clay", "clay")],
            &[k],
            |x, c, out| out.assign(&((&x["porosity"] + &x["clay"]) * c[0])),
        );
        let task = Task::new(regionaliser, Upscaler::element(Aggregator::ArithmeticMean));
        let calibrator = Calibrator::new(Toy::new(), registry, |_: &Toy| Ok(0.0), Strategy::grid(2).unwrap())
            .with_subregionaliser(subregionaliser)
            .with_task(task);
        let mut mpr = Mpr::new(source(), calibrator).with_preprocessor(preprocessor);

        // Act
        let requirements = mpr.requirements();
        mpr.activate().unwrap();

        // Assert
        assert_eq!(
            requirements,
            BTreeMap::from([(
                "raster".to_string(),
                BTreeSet::from(["clay".to_string(), "sand".to_string()])
            )])
        );
        assert_eq!(mpr.calibrator().names(), ["k".to_string(), "p".to_string()]);
        assert_eq!(mpr.providers().len(), 1);
    }

    #[test]
    // Purpose
    // -------
    // Running before activation is refused; afterwards the run returns the
    // calibrated likelihood.
    fn run_requires_activation() {
        let mut mpr = Mpr::new(source(), toy_calibrator(Strategy::grid(3).unwrap(), 0));

        let err = mpr.run().unwrap_err();
        mpr.activate().unwrap();
        let likelihood = mpr.run().unwrap();

        assert_eq!(err, MprError::NotActivated { component: "Mpr" });
        assert_eq!(likelihood, 0.0);
        assert_eq!(mpr.calibrator().nmb_steps(), 10);
    }
}
