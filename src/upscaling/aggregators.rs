//! Reduction functions applied to one group of samples.
//!
//! [`Aggregator::aggregate`] owns the missing-value policy: an empty group
//! or a group holding any NaN reduces to NaN before the chosen statistic is
//! consulted, so custom callables only ever see complete, finite-or-infinite
//! samples. Unweighted statistics come from `statrs`; the weighted means are
//! computed here from the per-sample weights (cell = 1.0, feature = size).
use std::{fmt, str::FromStr, sync::Arc};

use statrs::statistics::Statistics;

use crate::errors::{MprError, MprResult};

/// Custom reduction `(values, weights) -> value`.
pub type CustomAggregator = Arc<dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync>;

/// Aggregation function of an upscaler.
///
/// Parsing:
/// This enum implements `FromStr` for the built-in variants and accepts
/// case-insensitive names (`"arithmetic"`, `"geometric"`, `"harmonic"`,
/// their `"weighted_"` forms, `"max"`, `"min"`).
#[derive(Clone)]
pub enum Aggregator {
    ArithmeticMean,
    GeometricMean,
    HarmonicMean,
    /// `Σ wᵢxᵢ / Σ wᵢ`.
    WeightedArithmeticMean,
    /// `exp(Σ wᵢ ln xᵢ / Σ wᵢ)`.
    WeightedGeometricMean,
    /// `Σ wᵢ / Σ (wᵢ / xᵢ)`.
    WeightedHarmonicMean,
    Max,
    Min,
    Custom(CustomAggregator),
}

impl Aggregator {
    /// Wrap a closure as an aggregator.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static,
    {
        Aggregator::Custom(Arc::new(f))
    }

    /// Reduce one group; `weights` is aligned with `values`.
    pub fn aggregate(&self, values: &[f64], weights: &[f64]) -> f64 {
        if values.is_empty() || values.iter().any(|v| v.is_nan()) {
            return f64::NAN;
        }
        match self {
            Aggregator::ArithmeticMean => values.iter().mean(),
            Aggregator::GeometricMean => values.iter().geometric_mean(),
            Aggregator::HarmonicMean => values.iter().harmonic_mean(),
            Aggregator::WeightedArithmeticMean => {
                let (num, den) = weighted_sums(values, weights, |x| x);
                num / den
            }
            Aggregator::WeightedGeometricMean => {
                let (num, den) = weighted_sums(values, weights, f64::ln);
                (num / den).exp()
            }
            Aggregator::WeightedHarmonicMean => {
                let (num, den) = weighted_sums(values, weights, f64::recip);
                den / num
            }
            Aggregator::Max => Statistics::max(values.iter()),
            Aggregator::Min => Statistics::min(values.iter()),
            Aggregator::Custom(f) => f(values, weights),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Aggregator::ArithmeticMean => "arithmetic",
            Aggregator::GeometricMean => "geometric",
            Aggregator::HarmonicMean => "harmonic",
            Aggregator::WeightedArithmeticMean => "weighted_arithmetic",
            Aggregator::WeightedGeometricMean => "weighted_geometric",
            Aggregator::WeightedHarmonicMean => "weighted_harmonic",
            Aggregator::Max => "max",
            Aggregator::Min => "min",
            Aggregator::Custom(_) => "custom",
        }
    }
}

/// `(Σ wᵢ f(xᵢ), Σ wᵢ)`.
fn weighted_sums(values: &[f64], weights: &[f64], f: impl Fn(f64) -> f64) -> (f64, f64) {
    values
        .iter()
        .zip(weights)
        .fold((0.0, 0.0), |(num, den), (&x, &w)| (num + w * f(x), den + w))
}

impl Default for Aggregator {
    fn default() -> Self {
        Aggregator::ArithmeticMean
    }
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aggregator({})", self.label())
    }
}

impl FromStr for Aggregator {
    type Err = MprError;

    fn from_str(s: &str) -> MprResult<Self> {
        match s.to_lowercase().as_str() {
            "arithmetic" => Ok(Aggregator::ArithmeticMean),
            "geometric" => Ok(Aggregator::GeometricMean),
            "harmonic" => Ok(Aggregator::HarmonicMean),
            "weighted_arithmetic" => Ok(Aggregator::WeightedArithmeticMean),
            "weighted_geometric" => Ok(Aggregator::WeightedGeometricMean),
            "weighted_harmonic" => Ok(Aggregator::WeightedHarmonicMean),
            "max" => Ok(Aggregator::Max),
            "min" => Ok(Aggregator::Min),
            _ => Err(MprError::InvalidAggregator {
                name: s.to_string(),
                reason: "Valid options are case insensitive 'arithmetic', 'geometric', \
                         'harmonic', 'weighted_arithmetic', 'weighted_geometric', \
                         'weighted_harmonic', 'max' or 'min'.",
            }),
        }
    }
}
