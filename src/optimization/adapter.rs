//! Adapter that exposes a likelihood callback as an `argmin` problem.
//!
//! We convert the *maximization* of a likelihood `ℓ(x)` into a
//! *minimization* by defining the cost as `c(x) = -ℓ(x)`. On top of the
//! sign flip the adapter
//! - projects every candidate into the bounds before it reaches the
//!   objective, so the objective never sees an out-of-box vector;
//! - counts objective calls and refuses the call after the budget with
//!   [`MprError::BudgetExhausted`], which stops the executor;
//! - remembers the best point evaluated so far in a caller-owned
//!   [`Tracker`], which outlives the executor even when the run stops on
//!   the budget;
//! - evaluates the initial simplex in [`ArgMinAdapter::prime`], outside
//!   the executor, whose own initial pass cannot propagate errors. The
//!   primed likelihoods are handed back to that pass without a second
//!   objective call or budget charge.
//!
//! Non-finite likelihoods are reported to the solver as `+∞` cost, so a
//! failed simulation region is simply avoided.
use std::cell::RefCell;

use argmin::core::{CostFunction, Error};

use crate::{
    errors::MprError,
    optimization::{
        traits::{Bounds, Objective},
        types::{Cost, Theta},
    },
};

/// Best point evaluated so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Incumbent {
    pub x: Vec<f64>,
    pub value: f64,
}

/// Evaluation count and incumbent of one search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tracker {
    evaluations: usize,
    best: Option<Incumbent>,
}

impl Tracker {
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn best(&self) -> Option<&Incumbent> {
        self.best.as_ref()
    }

    fn record(&mut self, x: Vec<f64>, value: f64) {
        let improves = match &self.best {
            None => true,
            Some(best) => value > best.value || (best.value.is_nan() && !value.is_nan()),
        };
        if improves {
            self.best = Some(Incumbent { x, value });
        }
    }
}

/// Bridges a likelihood callback to `argmin`'s `CostFunction`.
pub struct ArgMinAdapter<'a, 'b> {
    objective: RefCell<&'a mut Objective<'b>>,
    bounds: &'a Bounds,
    maxeval: Option<usize>,
    tracker: &'a RefCell<Tracker>,
    primed: RefCell<Vec<(Vec<f64>, f64)>>,
}

impl<'a, 'b> ArgMinAdapter<'a, 'b> {
    pub fn new(
        objective: &'a mut Objective<'b>, bounds: &'a Bounds, maxeval: Option<usize>,
        tracker: &'a RefCell<Tracker>,
    ) -> Self {
        Self {
            objective: RefCell::new(objective),
            bounds,
            maxeval,
            tracker,
            primed: RefCell::new(Vec::new()),
        }
    }

    /// Evaluate every vertex once and keep its likelihood for the first
    /// `cost` request at exactly that vertex.
    ///
    /// # Errors
    /// - Everything [`ArgMinAdapter::evaluate`] raises. Vertices evaluated
    ///   before the error stay recorded in the tracker.
    pub fn prime(&self, vertices: &[Theta]) -> Result<(), MprError> {
        for vertex in vertices {
            let x = vertex.to_vec();
            let value = self.evaluate(&x)?;
            self.primed.borrow_mut().push((x, value));
        }
        Ok(())
    }

    fn take_primed(&self, x: &[f64]) -> Option<f64> {
        let mut primed = self.primed.borrow_mut();
        let position = primed.iter().position(|(vertex, _)| vertex.as_slice() == x)?;
        Some(primed.remove(position).1)
    }

    /// Evaluate `ℓ` at the projection of `x`, honouring the budget.
    ///
    /// # Errors
    /// - [`MprError::BudgetExhausted`] once `maxeval` calls were made.
    /// - Any error of the objective, unchanged.
    pub fn evaluate(&self, x: &[f64]) -> Result<f64, MprError> {
        let mut tracker = self.tracker.borrow_mut();
        if let Some(maxeval) = self.maxeval {
            if tracker.evaluations >= maxeval {
                return Err(MprError::BudgetExhausted { maxeval });
            }
        }
        let mut projected = x.to_vec();
        self.bounds.project(&mut projected);
        tracker.evaluations += 1;
        let mut objective = self.objective.borrow_mut();
        let value = (**objective)(&projected)?;
        tracker.record(projected, value);
        Ok(value)
    }
}

impl CostFunction for ArgMinAdapter<'_, '_> {
    type Param = Theta;
    type Output = Cost;

    /// Evaluate the cost `c(x) = -ℓ(x)`.
    ///
    /// # Errors
    /// Propagates [`ArgMinAdapter::evaluate`] errors; the crate's
    /// `From<argmin::core::Error>` recovers them unchanged.
    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        let x = theta.to_vec();
        let value = match self.take_primed(&x) {
            Some(value) => value,
            None => self.evaluate(&x)?,
        };
        if value.is_finite() { Ok(-value) } else { Ok(f64::INFINITY) }
    }
}
