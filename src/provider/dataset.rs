//! Data layers held by a provider: float datasets and integer id layers.
//!
//! A [`Dataset`] stores its values behind a shared, lockable array so that a
//! sub-regionaliser can publish its output once and keep rewriting it on
//! every calibration trial while consumers read the current values.
//! Masks are fixed when the layer is built.
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ndarray::ArrayD;

/// Float array shared between a provider and the equations bound to it.
pub type SharedArray = Arc<RwLock<ArrayD<f64>>>;

/// Float data layer with its validity mask (`true` = usable value).
#[derive(Debug, Clone)]
pub struct Dataset {
    values: SharedArray,
    mask: ArrayD<bool>,
}

impl Dataset {
    /// Float layer; NaN marks missing values.
    pub fn float(values: ArrayD<f64>) -> Self {
        let mask = values.mapv(|v| !v.is_nan());
        Self { values: Arc::new(RwLock::new(values)), mask }
    }

    /// Integer layer with an explicit missing value.
    ///
    /// Values are stored as `f64`; cells equal to `missing` become NaN.
    pub fn integer(values: ArrayD<i64>, missing: i64) -> Self {
        let mask = values.mapv(|v| v != missing);
        let floats = values.mapv(|v| if v == missing { f64::NAN } else { v as f64 });
        Self { values: Arc::new(RwLock::new(floats)), mask }
    }

    /// Layer sharing `values` with its producer, using a precomputed mask.
    pub fn shared(values: SharedArray, mask: ArrayD<bool>) -> Self {
        Self { values, mask }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.mask.shape().to_vec()
    }

    pub fn mask(&self) -> &ArrayD<bool> {
        &self.mask
    }

    /// Handle to the shared values.
    pub fn values(&self) -> SharedArray {
        Arc::clone(&self.values)
    }

    /// Read access to the current values.
    pub fn read(&self) -> RwLockReadGuard<'_, ArrayD<f64>> {
        read_shared(&self.values)
    }
}

/// Read guard that survives a poisoned lock; layers hold plain numbers, so
/// a panic elsewhere cannot leave them logically inconsistent.
pub fn read_shared(array: &SharedArray) -> RwLockReadGuard<'_, ArrayD<f64>> {
    array.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write guard counterpart of [`read_shared`].
pub fn write_shared(array: &SharedArray) -> RwLockWriteGuard<'_, ArrayD<f64>> {
    array.write().unwrap_or_else(PoisonError::into_inner)
}

/// Integer id layer (element or subunit ids) with its validity mask.
#[derive(Debug, Clone, PartialEq)]
pub struct IdLayer {
    values: ArrayD<i64>,
    mask: ArrayD<bool>,
}

impl IdLayer {
    /// Id layer where cells equal to `missing` carry no id.
    pub fn new(values: ArrayD<i64>, missing: i64) -> Self {
        let mask = values.mapv(|v| v != missing);
        Self { values, mask }
    }

    /// Id layer from optional entries, as read from attribute tables.
    pub fn from_options(values: &[Option<i64>]) -> Self {
        let mask = ArrayD::from_shape_fn(ndarray::IxDyn(&[values.len()]), |i| values[i[0]].is_some());
        let ids = ArrayD::from_shape_fn(ndarray::IxDyn(&[values.len()]), |i| values[i[0]].unwrap_or(0));
        Self { values: ids, mask }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.values.shape().to_vec()
    }

    pub fn values(&self) -> &ArrayD<i64> {
        &self.values
    }

    pub fn mask(&self) -> &ArrayD<bool> {
        &self.mask
    }
}
