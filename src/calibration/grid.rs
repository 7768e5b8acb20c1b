//! Exhaustive grid search over bounded coefficients.
//!
//! Every coefficient gets `nmb_nodes` evenly spaced fractions of its
//! `[lower, upper]` interval (`0, 1/(n-1), …, 1`; a single node sits at the
//! midpoint). The grid is the Cartesian product of these node sets, with
//! the last coefficient varying fastest; points are produced lazily, so
//! `nmb_nodes^k` never has to fit into memory.
use crate::errors::{MprError, MprResult};

/// Grid-search configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSearch {
    nmb_nodes: usize,
}

impl GridSearch {
    /// # Errors
    /// - [`MprError::InvalidNodes`] if `nmb_nodes == 0`.
    pub fn new(nmb_nodes: usize) -> MprResult<Self> {
        if nmb_nodes == 0 {
            return Err(MprError::InvalidNodes {
                nmb_nodes,
                reason: "At least one node per coefficient is required.",
            });
        }
        Ok(Self { nmb_nodes })
    }

    pub fn nmb_nodes(&self) -> usize {
        self.nmb_nodes
    }

    /// Node positions as fractions of the bound interval.
    pub fn fractions(&self) -> Vec<f64> {
        if self.nmb_nodes == 1 {
            return vec![0.5];
        }
        let last = (self.nmb_nodes - 1) as f64;
        (0..self.nmb_nodes).map(|i| i as f64 / last).collect()
    }

    /// Fail unless every coefficient has finite bounds.
    ///
    /// # Errors
    /// - [`MprError::MissingBound`] naming the first offending coefficient
    ///   and side.
    pub fn check_bounds(&self, names: &[String], lowers: &[f64], uppers: &[f64]) -> MprResult<()> {
        for ((name, lower), upper) in names.iter().zip(lowers).zip(uppers) {
            let side = if !lower.is_finite() {
                "lower"
            } else if !upper.is_finite() {
                "upper"
            } else {
                continue;
            };
            return Err(MprError::MissingBound {
                strategy: "GridSearch",
                coefficient: name.clone(),
                side,
            });
        }
        Ok(())
    }

    /// Number of grid points for `k` coefficients.
    pub fn nmb_points(&self, k: usize) -> usize {
        self.nmb_nodes.saturating_pow(k as u32)
    }

    /// Lazily enumerate all grid points.
    pub fn points(&self, lowers: &[f64], uppers: &[f64]) -> GridPoints {
        let axes = lowers
            .iter()
            .zip(uppers)
            .map(|(&lo, &hi)| self.fractions().into_iter().map(|f| lo + f * (hi - lo)).collect())
            .collect();
        GridPoints { axes, odometer: Some(vec![0; lowers.len()]) }
    }
}

impl Default for GridSearch {
    fn default() -> Self {
        Self { nmb_nodes: 3 }
    }
}

/// Iterator over the Cartesian product of per-coefficient node values.
#[derive(Debug, Clone)]
pub struct GridPoints {
    axes: Vec<Vec<f64>>,
    odometer: Option<Vec<usize>>,
}

impl Iterator for GridPoints {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Vec<f64>> {
        let odometer = self.odometer.as_mut()?;
        let point = odometer.iter().zip(&self.axes).map(|(&i, axis)| axis[i]).collect();
        let mut carry = true;
        for (digit, axis) in odometer.iter_mut().zip(&self.axes).rev() {
            *digit += 1;
            if *digit < axis.len() {
                carry = false;
                break;
            }
            *digit = 0;
        }
        if carry {
            self.odometer = None;
        }
        Some(point)
    }
}
