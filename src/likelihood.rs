//! likelihood — goodness-of-fit criteria for likelihood callbacks.
//!
//! All criteria compare an observed and a simulated series of equal length.
//! Pairs with a missing (NaN) observation are dropped first, as gauge
//! records routinely contain gaps. Length mismatches and series without a
//! single usable pair are likelihood errors, so a calibration never runs
//! on a meaningless score.
//!
//! - [`nse`]: Nash–Sutcliffe efficiency, `(-∞, 1]`, 1 is perfect.
//! - [`kge`]: Kling–Gupta efficiency, `(-∞, 1]`, 1 is perfect.
//! - [`rmse`]: root mean square error, `[0, ∞)`, 0 is perfect; negate it
//!   when used as a likelihood.
use statrs::statistics::Statistics;

use crate::errors::{MprError, MprResult};

fn paired(observed: &[f64], simulated: &[f64]) -> MprResult<(Vec<f64>, Vec<f64>)> {
    if observed.len() != simulated.len() {
        return Err(MprError::Likelihood {
            text: format!(
                "{} observed but {} simulated values",
                observed.len(),
                simulated.len()
            ),
        });
    }
    let (obs, sim): (Vec<f64>, Vec<f64>) =
        observed.iter().zip(simulated).filter(|(o, _)| !o.is_nan()).map(|(o, s)| (*o, *s)).unzip();
    if obs.is_empty() {
        return Err(MprError::Likelihood { text: "no observed values available".to_string() });
    }
    Ok((obs, sim))
}

/// Nash–Sutcliffe efficiency.
///
/// Constant observations have no variance to explain and give `-∞`.
pub fn nse(observed: &[f64], simulated: &[f64]) -> MprResult<f64> {
    let (obs, sim) = paired(observed, simulated)?;
    let mean = obs.iter().mean();
    let numerator: f64 = obs.iter().zip(&sim).map(|(o, s)| (o - s).powi(2)).sum();
    let denominator: f64 = obs.iter().map(|o| (o - mean).powi(2)).sum();
    if denominator == 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(1.0 - numerator / denominator)
}

/// Kling–Gupta efficiency (2009 variant) from correlation, variability
/// ratio and bias ratio.
pub fn kge(observed: &[f64], simulated: &[f64]) -> MprResult<f64> {
    let (obs, sim) = paired(observed, simulated)?;
    let (mean_o, mean_s) = (obs.iter().mean(), sim.iter().mean());
    let (std_o, std_s) = (obs.iter().population_std_dev(), sim.iter().population_std_dev());
    let r = if std_o == 0.0 || std_s == 0.0 {
        0.0
    } else {
        obs.iter().population_covariance(sim.iter()) / (std_o * std_s)
    };
    let alpha = if std_o == 0.0 { 0.0 } else { std_s / std_o };
    let beta = if mean_o == 0.0 { 0.0 } else { mean_s / mean_o };
    Ok(1.0 - ((r - 1.0).powi(2) + (alpha - 1.0).powi(2) + (beta - 1.0).powi(2)).sqrt())
}

/// Root mean square error.
pub fn rmse(observed: &[f64], simulated: &[f64]) -> MprResult<f64> {
    let (obs, sim) = paired(observed, simulated)?;
    Ok(obs.iter().zip(&sim).map(|(o, s)| (o - s).powi(2)).mean().sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    // Purpose
    // -------
    // Known values of all three criteria.
    //
    // Given
    // -----
    // - obs = [1, 2, 3, 4, 5], sim = [1.1, 2.2, 2.8, 4.1, 4.9].
    //
    // Expect
    // ------
    // - NSE = 1 - 0.11/10 = 0.989; RMSE = √(0.11/5); perfect fits give 1
    //   and 0.
    fn known_values() {
        let obs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let sim = [1.1, 2.2, 2.8, 4.1, 4.9];

        assert_relative_eq!(nse(&obs, &sim).unwrap(), 0.989, epsilon = 1e-10);
        assert_relative_eq!(rmse(&obs, &sim).unwrap(), (0.11_f64 / 5.0).sqrt(), epsilon = 1e-10);
        assert_relative_eq!(kge(&obs, &obs).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(nse(&obs, &obs).unwrap(), 1.0);
    }

    #[test]
    // Purpose
    // -------
    // Missing observations are skipped; unusable inputs are likelihood
    // errors.
    fn gaps_and_invalid_inputs() {
        let obs = [1.0, f64::NAN, 3.0];
        let sim = [1.0, 100.0, 3.0];

        assert_relative_eq!(rmse(&obs, &sim).unwrap(), 0.0);
        assert!(matches!(nse(&[1.0], &[1.0, 2.0]), Err(MprError::Likelihood { .. })));
        assert!(matches!(kge(&[f64::NAN], &[1.0]), Err(MprError::Likelihood { .. })));
        assert_eq!(nse(&[2.0, 2.0], &[1.0, 3.0]).unwrap(), f64::NEG_INFINITY);
    }
}
