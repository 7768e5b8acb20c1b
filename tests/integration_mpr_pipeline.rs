//! Integration tests for the complete regionalisation pipeline.
//!
//! Purpose
//! -------
//! - Validate the end-to-end path from providers through preprocessing,
//!   sub-regionalisation, element- and subunit-level upscaling, and
//!   transformers into a simulation, scored by a likelihood and calibrated
//!   by grid search and Nelder–Mead via the `Mpr` manager.
//! - Use a synthetic "truth": observations are produced by the same
//!   pipeline at known coefficient values, so a successful calibration
//!   must recover them.
//!
//! Coverage
//! --------
//! - `provider`: raster group with subunits and a missing cell, feature
//!   collection with sizes, in-memory source.
//! - `regionalisation`: preprocessor → sub-regionaliser → regionaliser
//!   dependency chain and NaN masking.
//! - `upscaling`: arithmetic, harmonic and size-weighted means.
//! - `transforming`: element, subunit, and submodel targets.
//! - `calibration`: grid exhaustiveness, worker pool, Nelder–Mead budget.
//! - `logging` and `writing`: files produced by a full run.
//!
//! Exclusions
//! ----------
//! - File-format readers; providers are built in memory.
//! - Edge cases of single components, covered by unit tests.
use std::{collections::BTreeMap, fs, sync::Arc};

use approx::assert_abs_diff_eq;
use ndarray::{arr1, arr2};
use rust_mpr::{
    likelihood::nse,
    optimization::{NelderMeadOptimizer, NelderMeadOptions, Optimizer},
    prelude::*,
};

/// Sorted by name: c, k, l, p.
const TRUTH: [f64; 4] = [2.0, 1.0, 2.0, 0.5];

/// Toy catchment: every element contributes `fc`, both `cfmax` entries
/// and the routing `lag` to the simulated series, shifted by a storage
/// term that grows with every run unless conditions are restored.
struct Catchment {
    graph: ElementGraph,
    storage: f64,
    series: Vec<f64>,
}

impl Catchment {
    fn new() -> Self {
        let land = || {
            ModelNode::new("hland_96")
                .with_parameter("fc", Parameter::scalar(100.0))
                .with_parameter("cfmax", Parameter::vector(vec![3.0, 3.0]))
                .with_submodel(ModelNode::new("rconc_nash").with_parameter("lag", Parameter::scalar(1.0)))
        };
        let graph = ElementGraph::new()
            .with_element("land_dill", land())
            .with_element("land_lahn_1", land())
            .with_element("land_lahn_2", land());
        Self { graph, storage: 0.0, series: Vec::new() }
    }
}

impl Simulation for Catchment {
    type Conditions = f64;

    fn conditions(&self) -> f64 {
        self.storage
    }

    fn set_conditions(&mut self, conditions: f64) {
        self.storage = conditions;
    }

    fn simulate(&mut self) -> MprResult<()> {
        let mut series = Vec::new();
        for (name, _) in self.graph.iter() {
            series.push(self.graph.parameter(name, &[], "fc")?.value());
            series.extend_from_slice(self.graph.parameter(name, &[], "cfmax")?.values());
            series.push(self.graph.parameter(name, &[0], "lag")?.value());
        }
        self.series = series.into_iter().map(|v| v + self.storage).collect();
        self.storage += 1.0;
        Ok(())
    }

    fn elements(&self) -> &ElementGraph {
        &self.graph
    }

    fn elements_mut(&mut self) -> &mut ElementGraph {
        &mut self.graph
    }
}

fn names() -> BTreeMap<i64, String> {
    BTreeMap::from([
        (1, "land_dill".to_string()),
        (2, "land_lahn_1".to_string()),
        (3, "land_lahn_2".to_string()),
    ])
}

/// 3×3 raster with element and subunit ids; the lower right cell has no
/// ids and one clay value is missing.
fn source() -> InMemorySource {
    let raster = Provider::raster(
        "lahn_raster",
        IdLayer::new(arr2(&[[1, 1, 2], [1, 2, 2], [3, 3, -1]]).into_dyn(), -1),
        names(),
    )
    .unwrap()
    .with_subunits(IdLayer::new(arr2(&[[0, 1, 0], [0, 1, 1], [0, 1, -1]]).into_dyn(), -1))
    .unwrap()
    .with_dataset(
        "clay",
        Dataset::float(arr2(&[[10.0, 20.0, 30.0], [10.0, 40.0, 50.0], [20.0, f64::NAN, 5.0]]).into_dyn()),
    )
    .unwrap()
    .with_dataset(
        "sand",
        Dataset::float(arr2(&[[40.0, 30.0, 20.0], [50.0, 20.0, 10.0], [30.0, 30.0, 5.0]]).into_dyn()),
    )
    .unwrap();
    let rivers = Provider::features(
        "lahn_rivers",
        IdLayer::new(arr1(&[1, 2, 3, 3]).into_dyn(), -1),
        vec![1.0, 1.0, 1.0, 3.0],
        names(),
    )
    .unwrap()
    .with_dataset("slope", Dataset::float(arr1(&[0.1, 0.2, 0.4, 0.8]).into_dyn()))
    .unwrap();
    InMemorySource::new().with_provider(raster).with_provider(rivers)
}

/// Calibrator with all sub-regionalisers and tasks.
///
/// - Preprocessor `sandfrac = sand / (sand + clay)`.
/// - Sub-regionaliser `porosity = p · sandfrac`.
/// - Element task `fc = k · clay / 10 + porosity`, arithmetic mean.
/// - Subunit task `cfmax = c · sand / 10`, harmonic mean.
/// - Feature task `lag = l · slope`, size-weighted mean, written into the
///   `rconc_nash` submodel.
fn calibrator<F>(strategy: Strategy, threads: usize, likelihood: F) -> Calibrator<Catchment>
where
    F: FnMut(&Catchment) -> MprResult<f64> + Send + 'static,
{
    let mut registry = CoefficientRegistry::new();
    let k = registry.register(Coefficient::bounded("k", 0.5, 0.0, 2.0)).unwrap();
    let p = registry.register(Coefficient::bounded("p", 0.2, 0.0, 1.0)).unwrap();
    let c = registry.register(Coefficient::bounded("c", 1.5, 1.0, 3.0)).unwrap();
    let l = registry.register(Coefficient::bounded("l", 1.0, 0.0, 4.0)).unwrap();

    let porosity = Subregionaliser::new(
        "porosity",
        "lahn_raster",
        &[("sandfrac", "sandfrac")],
        &[p],
        |x, c, out| out.assign(&(&x["sandfrac"] * c[0])),
    );
    let fc = Task::new(
        Regionaliser::new(
            "fc",
            "lahn_raster",
            &[("clay", "clay"), ("porosity", "porosity")],
            &[k],
            |x, c, out| out.assign(&(&x["clay"] * (c[0] / 10.0) + &x["porosity"])),
        ),
        Upscaler::element(Aggregator::ArithmeticMean),
    )
    .with_transformer(Transformer::element("fc", Identity));
    let cfmax = Task::new(
        Regionaliser::new("cfmax", "lahn_raster", &[("sand", "sand")], &[c], |x, c, out| {
            out.assign(&(&x["sand"] * (c[0] / 10.0)))
        }),
        Upscaler::subunit("harmonic".parse().unwrap()),
    )
    .with_transformer(Transformer::subunit("cfmax", Identity));
    let lag = Task::new(
        Regionaliser::new("lag", "lahn_rivers", &[("slope", "slope")], &[l], |x, c, out| {
            out.assign(&(&x["slope"] * c[0]))
        }),
        Upscaler::element(Aggregator::WeightedArithmeticMean),
    )
    .with_transformer(Transformer::element("lag", Identity).with_model("rconc_nash"));

    Calibrator::new(Catchment::new(), registry, likelihood, strategy)
        .with_options(CalibrationOptions::new(threads).unwrap())
        .with_subregionaliser(porosity)
        .with_task(fc)
        .with_task(cfmax)
        .with_task(lag)
}

/// Complete setup around `calibrator`, including the `sandfrac`
/// preprocessor.
fn setup(calibrator: Calibrator<Catchment>) -> Mpr<Catchment> {
    let sandfrac = Preprocessor::new(
        "sandfrac",
        "lahn_raster",
        &[("sand", "sand"), ("clay", "clay")],
        |x, _, out| out.assign(&(&x["sand"] / &(&x["sand"] + &x["clay"]))),
    );
    Mpr::new(source(), calibrator).with_preprocessor(sandfrac)
}

fn build<F>(strategy: Strategy, threads: usize, likelihood: F) -> Mpr<Catchment>
where
    F: FnMut(&Catchment) -> MprResult<f64> + Send + 'static,
{
    setup(calibrator(strategy, threads, likelihood))
}

/// Simulated series at [`TRUTH`].
fn observed() -> Vec<f64> {
    let mut reference = build(Strategy::grid(1).unwrap(), 0, |_: &Catchment| Ok(0.0));
    reference.activate().unwrap();
    reference.calibrator_mut().perform_calibrationstep(&TRUTH, false).unwrap();
    reference.calibrator().simulation().series.clone()
}

fn nse_against(observed: Vec<f64>) -> impl FnMut(&Catchment) -> MprResult<f64> + Send + 'static {
    move |catchment: &Catchment| nse(&observed, &catchment.series)
}

#[test]
// Purpose
// -------
// The reference run produces the values implied by the formulas, masks
// and aggregators.
//
// Given
// -----
// - Coefficients at TRUTH (c = 2, k = 1, l = 2, p = 0.5).
//
// Expect
// ------
// - land_dill: fc = mean(1 + 0.4, 2 + 0.3, 1 + 5/12), cfmax = (hmean(8, 10),
//   6), lag = 0.2.
// - land_lahn_2: fc from its only unmasked cell, lag weighted by size.
fn reference_run_matches_hand_computation() {
    // Act
    let series = observed();

    // Assert
    assert_eq!(series.len(), 3 * 4);
    assert_abs_diff_eq!(series[0], (1.4 + 2.3 + (1.0 + 5.0 / 12.0)) / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(series[1], 2.0 / (1.0 / 8.0 + 1.0 / 10.0), epsilon = 1e-12);
    assert_abs_diff_eq!(series[2], 6.0, epsilon = 1e-12);
    assert_abs_diff_eq!(series[3], 0.2, epsilon = 1e-12);
    assert_abs_diff_eq!(series[8], 2.0 + 0.5 * 0.6, epsilon = 1e-12);
    assert_abs_diff_eq!(series[11], (0.8 + 3.0 * 1.6) / 4.0, epsilon = 1e-12);
}

#[test]
// Purpose
// -------
// Grid search over four coefficients is exhaustive, recovers the truth and
// leaves the simulation in the optimal state; logger and writers record
// the run.
//
// Given
// -----
// - Three nodes per coefficient, truth at the interval midpoints.
//
// Expect
// ------
// - 3⁴ + 1 = 82 steps, NSE = 1 at TRUTH.
// - A log with header plus 82 rows, a coefficient table, and a parameter
//   table with one row per element and parameter.
fn grid_search_recovers_truth_and_writes_results() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("calibration.log");
    let calibrator = calibrator(Strategy::grid(3).unwrap(), 0, nse_against(observed()))
        .with_logger(CoefficientLog::new(&log_path).with_documentation(["grid search over c, k, l, p"]));
    let mut mpr = setup(calibrator)
        .with_writer(CoefficientTableWriter::new(dir.path().join("coefficients.tsv")))
        .with_writer(ParameterTableWriter::new(dir.path().join("parameters.tsv")));

    // Act
    mpr.activate().unwrap();
    let likelihood = mpr.run().unwrap();

    // Assert
    let calibrator = mpr.calibrator();
    assert_eq!(calibrator.nmb_steps(), 82);
    assert_eq!(calibrator.values(), TRUTH.to_vec());
    assert_abs_diff_eq!(likelihood, 1.0);
    assert_eq!(calibrator.simulation().series, observed());

    let log = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines[..3], ["grid search over c, k, l, p", "", "likelihood\tc\tk\tl\tp"]);
    assert_eq!(lines.len(), 3 + 82);

    let coefficients = fs::read_to_string(dir.path().join("coefficients.tsv")).unwrap();
    assert!(coefficients.contains("\nk\t0\t2\t0.5\t1\n"));
    let parameters = fs::read_to_string(dir.path().join("parameters.tsv")).unwrap();
    assert_eq!(parameters.lines().count(), 1 + 3 * 3);
    assert!(parameters.contains("\nland_dill\tcfmax\t"));
    assert!(parameters.contains("\nland_lahn_1\tlag\t"));
}

#[test]
// Purpose
// -------
// A worker pool for the tasks does not change any result.
fn pooled_tasks_match_sequential_tasks() {
    let observed = observed();
    let mut sequential = build(Strategy::grid(2).unwrap(), 0, nse_against(observed.clone()));
    let mut pooled = build(Strategy::grid(2).unwrap(), 3, nse_against(observed));
    sequential.activate().unwrap();
    pooled.activate().unwrap();

    let a = sequential.run().unwrap();
    let b = pooled.run().unwrap();

    assert_eq!(a, b);
    assert_eq!(sequential.calibrator().values(), pooled.calibrator().values());
    assert_eq!(sequential.calibrator().nmb_steps(), 2 * 2 * 2 * 2 + 1);
}

#[test]
// Purpose
// -------
// Nelder–Mead improves on the defaults, stays inside the bounds and
// respects its evaluation budget.
//
// Given
// -----
// - Start at the defaults (c = 1.5, k = 0.5, l = 1, p = 0.2), budget 400.
//
// Expect
// ------
// - At most 1 + 400 + 1 steps; final NSE close to 1; all values within
//   bounds.
fn nelder_mead_approaches_truth_within_budget() {
    // Arrange
    let options = NelderMeadOptions::new(1_000, 1e-12, 0.25, false).unwrap();
    let backend: Arc<dyn Optimizer> = Arc::new(NelderMeadOptimizer::new(options));
    let strategy = Strategy::optimizer(backend, Some(400)).unwrap();
    let mut mpr = build(strategy, 0, nse_against(observed()));
    mpr.activate().unwrap();
    let start = mpr.calibrator_mut().perform_calibrationstep(&[1.5, 0.5, 1.0, 0.2], false).unwrap();

    // Act
    let likelihood = mpr.run().unwrap();

    // Assert
    let calibrator = mpr.calibrator();
    assert!(calibrator.nmb_steps() <= 1 + 400 + 1);
    assert!(likelihood > start);
    assert!(likelihood > 0.95);
    for ((value, lower), upper) in calibrator.values().iter().zip(calibrator.lowers()).zip(calibrator.uppers()) {
        assert!((lower..=upper).contains(value));
    }
}

#[test]
// Purpose
// -------
// A budget-bound Nelder–Mead run costs exactly its budget plus the final
// re-application step.
//
// Given
// -----
// - Four coefficients, budget 40, which is far too small to meet the
//   simplex tolerance; one extra step at the defaults before the run.
//
// Expect
// ------
// - 1 + 40 + 1 steps and a likelihood no worse than at the defaults.
fn nelder_mead_spends_exact_budget() {
    // Arrange
    let options = NelderMeadOptions::new(1_000, 1e-12, 0.25, false).unwrap();
    let backend: Arc<dyn Optimizer> = Arc::new(NelderMeadOptimizer::new(options));
    let strategy = Strategy::optimizer(backend, Some(40)).unwrap();
    let mut mpr = build(strategy, 0, nse_against(observed()));
    mpr.activate().unwrap();
    let start = mpr.calibrator_mut().perform_calibrationstep(&[1.5, 0.5, 1.0, 0.2], false).unwrap();

    // Act
    let likelihood = mpr.run().unwrap();

    // Assert
    assert_eq!(mpr.calibrator().nmb_steps(), 1 + 40 + 1);
    assert!(likelihood >= start);
}

#[test]
// Purpose
// -------
// Configuration errors surface at activation, before any trial.
fn missing_dataset_fails_activation() {
    let mut registry = CoefficientRegistry::new();
    let k = registry.register(Coefficient::bounded("k", 1.0, 0.0, 2.0)).unwrap();
    let task = Task::new(
        Regionaliser::new("fc", "lahn_raster", &[("silt", "silt")], &[k], |x, c, out| {
            out.assign(&(&x["silt"] * c[0]))
        }),
        Upscaler::element(Aggregator::default()),
    );
    let calibrator =
        Calibrator::new(Catchment::new(), registry, |_: &Catchment| Ok(0.0), Strategy::grid(3).unwrap())
            .with_task(task);
    let mut mpr = Mpr::new(source(), calibrator);

    let err = mpr.activate().unwrap_err();

    assert_eq!(
        err,
        MprError::MissingDataset { provider: "lahn_raster".to_string(), dataset: "silt".to_string() }
    );
}
