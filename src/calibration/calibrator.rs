//! Calibrator — the calibration-step primitive and the two search drivers.
//!
//! Purpose
//! -------
//! Own everything one calibration trial touches: the coefficient registry,
//! the tasks and sub-regionalisers, the simulation and the likelihood
//! callback. [`Calibrator::perform_calibrationstep`] turns a coefficient
//! vector into a likelihood; [`Calibrator::calibrate`] searches for the
//! vector maximising it.
//!
//! Key behaviors
//! -------------
//! - One step: write values positionally → recompute sub-regionalisers →
//!   regionalise every task (in a rayon pool when `threads > 0`) → transform
//!   in declaration order → restore conditions → simulate → score →
//!   count → notify loggers.
//! - Grid search evaluates `n^k` points plus one final step at the best
//!   point; black-box search evaluates whatever the backend asks for plus
//!   one final step at its result. Either way the simulation is left in the
//!   state belonging to the reported optimum.
//!
//! Invariants & assumptions
//! ------------------------
//! - The coefficient order is fixed at activation: deduplicated over all
//!   tasks and sub-regionalisers and sorted by name.
//! - Coefficient values are written in step 1 of a trial and nowhere else.
//! - Conditions are captured once at activation and restored before every
//!   simulation run.
//! - Errors from the likelihood callback or the simulation abort the run.
use std::{fmt, sync::Arc};

use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use tracing::{debug, info};

use crate::{
    calibration::grid::GridSearch,
    coefficients::{Coefficient, CoefficientId, CoefficientRegistry},
    errors::{MprError, MprResult},
    logging::CalibrationLogger,
    optimization::{Bounds, Optimizer, validation::verify_maxeval},
    provider::ProviderCache,
    regionalisation::Subregionaliser,
    simulation::Simulation,
    task::Task,
};

/// Likelihood callback evaluated after every simulation run.
pub type LikelihoodFn<S> = Box<dyn FnMut(&S) -> MprResult<f64> + Send>;

/// Calibrator configuration.
///
/// - `threads`: size of the worker pool used for the regionalisation phase
///   of the tasks; `0` runs tasks sequentially in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationOptions {
    pub threads: usize,
}

impl CalibrationOptions {
    /// # Errors
    /// - [`MprError::ThreadPool`] if `threads` exceeds what rayon supports.
    pub fn new(threads: usize) -> MprResult<Self> {
        if threads > rayon::max_num_threads() {
            return Err(MprError::ThreadPool {
                text: format!(
                    "{threads} threads requested, at most {} are supported.",
                    rayon::max_num_threads()
                ),
            });
        }
        Ok(Self { threads })
    }
}

/// Search strategy over the coefficient vector.
#[derive(Clone)]
pub enum Strategy {
    /// Exhaustive grid search.
    Grid(GridSearch),
    /// Black-box maximization with an optional evaluation budget.
    Optimizer { backend: Arc<dyn Optimizer>, maxeval: Option<usize> },
}

impl Strategy {
    /// # Errors
    /// - [`MprError::InvalidNodes`] if `nmb_nodes == 0`.
    pub fn grid(nmb_nodes: usize) -> MprResult<Self> {
        Ok(Strategy::Grid(GridSearch::new(nmb_nodes)?))
    }

    /// # Errors
    /// - [`MprError::InvalidMaxEval`] for a zero budget.
    pub fn optimizer(backend: Arc<dyn Optimizer>, maxeval: Option<usize>) -> MprResult<Self> {
        verify_maxeval(maxeval)?;
        Ok(Strategy::Optimizer { backend, maxeval })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Grid(_) => "GridSearch",
            Strategy::Optimizer { backend, .. } => backend.name(),
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Grid(grid) => f.debug_tuple("Grid").field(grid).finish(),
            Strategy::Optimizer { backend, maxeval } => f
                .debug_struct("Optimizer")
                .field("backend", &backend.name())
                .field("maxeval", maxeval)
                .finish(),
        }
    }
}

/// State fixed at activation.
struct Activation<C> {
    ids: Vec<CoefficientId>,
    names: Vec<String>,
    conditions: C,
    pool: Option<ThreadPool>,
}

/// Drives calibration trials against one simulation.
pub struct Calibrator<S: Simulation> {
    simulation: S,
    registry: CoefficientRegistry,
    likelihood_fn: LikelihoodFn<S>,
    strategy: Strategy,
    options: CalibrationOptions,
    subregionalisers: Vec<Subregionaliser>,
    tasks: Vec<Task>,
    loggers: Vec<Box<dyn CalibrationLogger>>,
    activation: Option<Activation<S::Conditions>>,
    nmb_steps: usize,
    likelihood: f64,
}

impl<S: Simulation> Calibrator<S> {
    pub fn new<F>(
        simulation: S, registry: CoefficientRegistry, likelihood_fn: F, strategy: Strategy,
    ) -> Self
    where
        F: FnMut(&S) -> MprResult<f64> + Send + 'static,
    {
        Self {
            simulation,
            registry,
            likelihood_fn: Box::new(likelihood_fn),
            strategy,
            options: CalibrationOptions::default(),
            subregionalisers: Vec::new(),
            tasks: Vec::new(),
            loggers: Vec::new(),
            activation: None,
            nmb_steps: 0,
            likelihood: f64::NAN,
        }
    }

    pub fn with_options(mut self, options: CalibrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Sub-regionalisers are recomputed in the order they are added.
    pub fn with_subregionaliser(mut self, subregionaliser: Subregionaliser) -> Self {
        self.subregionalisers.push(subregionaliser);
        self
    }

    pub fn with_logger(mut self, logger: impl CalibrationLogger + 'static) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    /// Bind sub-regionalisers and tasks to their providers, fix the
    /// coefficient order, capture the simulation conditions and build the
    /// worker pool.
    ///
    /// Sub-regionalisers are activated first so that the datasets they
    /// publish are available to the tasks.
    ///
    /// # Errors
    /// - Any activation error of the components.
    /// - [`MprError::ThreadPool`] if the pool cannot be built.
    pub fn activate(&mut self, cache: &mut ProviderCache) -> MprResult<()> {
        for subregionaliser in &mut self.subregionalisers {
            let provider = cache.get_mut(subregionaliser.source())?;
            subregionaliser.activate(provider)?;
        }
        for task in &mut self.tasks {
            let provider = cache.get(task.source())?;
            task.activate(provider, self.simulation.elements())?;
        }
        let used = self
            .subregionalisers
            .iter()
            .flat_map(|s| s.coefficients())
            .chain(self.tasks.iter().flat_map(|t| t.coefficients()))
            .copied();
        let ids = self.registry.sorted_ids(used)?;
        let names = ids
            .iter()
            .map(|&id| Ok(self.registry.get(id)?.name().to_string()))
            .collect::<MprResult<Vec<_>>>()?;
        let pool = match self.options.threads {
            0 => None,
            threads => Some(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|err| MprError::ThreadPool { text: err.to_string() })?,
            ),
        };
        for logger in &mut self.loggers {
            logger.activate()?;
        }
        info!(
            coefficients = ids.len(),
            tasks = self.tasks.len(),
            subregionalisers = self.subregionalisers.len(),
            threads = self.options.threads,
            strategy = self.strategy.label(),
            "calibrator activated"
        );
        let conditions = self.simulation.conditions();
        self.activation = Some(Activation { ids, names, conditions, pool });
        Ok(())
    }

    pub fn is_activated(&self) -> bool {
        self.activation.is_some()
    }

    fn activation(&self) -> MprResult<&Activation<S::Conditions>> {
        self.activation.as_ref().ok_or(MprError::NotActivated { component: "Calibrator" })
    }

    /// Write `values` and push them through every task into the simulation
    /// parameters, without simulating.
    ///
    /// # Errors
    /// - [`MprError::NotActivated`] before [`Calibrator::activate`].
    /// - [`MprError::ValuesLengthMismatch`] for a vector of the wrong length.
    pub(crate) fn apply_values(&mut self, values: &[f64]) -> MprResult<()> {
        let activation =
            self.activation.as_ref().ok_or(MprError::NotActivated { component: "Calibrator" })?;
        self.registry.assign(&activation.ids, values)?;
        for subregionaliser in &self.subregionalisers {
            subregionaliser.apply_coefficients(&self.registry)?;
        }
        let registry = &self.registry;
        let tasks = &mut self.tasks;
        match &activation.pool {
            Some(pool) => {
                pool.install(|| tasks.par_iter_mut().try_for_each(|task| task.regionalise(registry)))?
            }
            None => tasks.iter_mut().try_for_each(|task| task.regionalise(registry))?,
        }
        let graph = self.simulation.elements_mut();
        for task in &self.tasks {
            task.transform(graph)?;
        }
        Ok(())
    }

    /// Evaluate the whole pipeline for one coefficient vector and return its
    /// likelihood.
    ///
    /// # Errors
    /// - [`MprError::NotActivated`] before [`Calibrator::activate`].
    /// - [`MprError::ValuesLengthMismatch`] for a vector of the wrong length.
    /// - Simulation, likelihood, and logger errors, unchanged.
    pub fn perform_calibrationstep(&mut self, values: &[f64], apply_loggers: bool) -> MprResult<f64> {
        self.apply_values(values)?;
        let activation =
            self.activation.as_ref().ok_or(MprError::NotActivated { component: "Calibrator" })?;
        self.simulation.set_conditions(activation.conditions.clone());
        self.simulation.simulate()?;
        let likelihood = (self.likelihood_fn)(&self.simulation)?;
        self.nmb_steps += 1;
        self.likelihood = likelihood;
        debug!(step = self.nmb_steps, likelihood, "calibration step");
        if apply_loggers {
            for logger in &mut self.loggers {
                logger.log(self.nmb_steps, likelihood, &activation.names, values)?;
            }
        }
        Ok(likelihood)
    }

    /// Run the configured search to completion and return the likelihood of
    /// the best vector, which stays applied.
    ///
    /// # Errors
    /// - [`MprError::NoCoefficients`] if no coefficient takes part.
    /// - [`MprError::MissingBound`] for grid search over unbounded
    ///   coefficients.
    /// - Every error a calibration step raises.
    pub fn calibrate(&mut self) -> MprResult<f64> {
        if self.activation()?.ids.is_empty() {
            return Err(MprError::NoCoefficients);
        }
        match self.strategy.clone() {
            Strategy::Grid(grid) => self.grid_search(grid),
            Strategy::Optimizer { backend, maxeval } => self.black_box_search(backend.as_ref(), maxeval),
        }
    }

    fn grid_search(&mut self, grid: GridSearch) -> MprResult<f64> {
        let (lowers, uppers) = (self.lowers(), self.uppers());
        grid.check_bounds(self.names(), &lowers, &uppers)?;
        let mut best: Option<(f64, Vec<f64>)> = None;
        for point in grid.points(&lowers, &uppers) {
            let likelihood = self.perform_calibrationstep(&point, true)?;
            let improves = match &best {
                None => true,
                Some((incumbent, _)) => {
                    likelihood > *incumbent || (incumbent.is_nan() && !likelihood.is_nan())
                }
            };
            if improves {
                best = Some((likelihood, point));
            }
        }
        let (likelihood, point) = best.ok_or(MprError::NoEvaluatedPoint)?;
        info!(likelihood, values = ?point, points = grid.nmb_points(point.len()), "best grid point");
        self.perform_calibrationstep(&point, true)
    }

    fn black_box_search(&mut self, backend: &dyn Optimizer, maxeval: Option<usize>) -> MprResult<f64> {
        let bounds = Bounds::new(self.lowers(), self.uppers())?;
        let x0 = self.values();
        let outcome = {
            let mut objective = |x: &[f64]| self.perform_calibrationstep(x, true);
            backend.optimize(&mut objective, &bounds, &x0, maxeval)?
        };
        info!(
            optimizer = backend.name(),
            likelihood = outcome.value,
            evaluations = outcome.evaluations,
            status = %outcome.status,
            "black-box search finished"
        );
        self.perform_calibrationstep(&outcome.x_hat, true)
    }

    fn column(&self, field: impl Fn(&Coefficient) -> f64) -> Vec<f64> {
        self.coefficient_ids()
            .iter()
            .filter_map(|&id| self.registry.get(id).ok())
            .map(field)
            .collect()
    }

    /// Coefficient handles in calibration order; empty before activation.
    pub fn coefficient_ids(&self) -> &[CoefficientId] {
        self.activation.as_ref().map(|a| a.ids.as_slice()).unwrap_or_default()
    }

    /// Coefficient names in calibration order; empty before activation.
    pub fn names(&self) -> &[String] {
        self.activation.as_ref().map(|a| a.names.as_slice()).unwrap_or_default()
    }

    pub fn lowers(&self) -> Vec<f64> {
        self.column(Coefficient::lower)
    }

    pub fn uppers(&self) -> Vec<f64> {
        self.column(Coefficient::upper)
    }

    pub fn values(&self) -> Vec<f64> {
        self.column(Coefficient::value)
    }

    pub fn defaults(&self) -> Vec<f64> {
        self.column(Coefficient::default)
    }

    pub fn nmb_steps(&self) -> usize {
        self.nmb_steps
    }

    /// Likelihood of the latest step; NaN before the first one.
    pub fn likelihood(&self) -> f64 {
        self.likelihood
    }

    pub fn registry(&self) -> &CoefficientRegistry {
        &self.registry
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut S {
        &mut self.simulation
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn subregionalisers(&self) -> &[Subregionaliser] {
        &self.subregionalisers
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn options(&self) -> &CalibrationOptions {
        &self.options
    }
}
