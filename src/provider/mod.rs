//! provider — aligned data layers of one spatial domain.
//!
//! Purpose
//! -------
//! Represent the read-only source of geodata an equation binds to: either a
//! raster group (2-D grids) or a feature collection (1-D attribute vectors).
//! A provider exposes its shape, an element-id layer, an optional subunit-id
//! layer, a name-keyed table of float datasets, and a table mapping element
//! ids to the element names of the downstream simulation.
//!
//! Key behaviors
//! -------------
//! - [`Provider::raster`] and [`Provider::features`] fix the shape from the
//!   element-id layer; every layer added later via
//!   [`Provider::with_subunits`] or [`Provider::with_dataset`] must match it
//!   exactly, otherwise construction fails with [`MprError::ShapeMismatch`].
//! - Feature collections additionally carry a `size` vector (polygon area or
//!   line length) used as aggregation weight; raster cells weigh 1.0.
//! - [`Provider::publish`] adds datasets produced by preprocessors and
//!   sub-regionalisers so later equations can bind them as ordinary inputs.
//! - [`sources`] holds the reader contract and the lazy per-name cache.
//!
//! Invariants & assumptions
//! ------------------------
//! - All datasets and both id layers share the provider's shape.
//! - Raster providers are 2-D, feature collections 1-D.
//! - `id_to_name` is ordered by id; its key set defines the element ids known
//!   to upscalers.
pub mod dataset;
pub mod sources;

use std::collections::BTreeMap;

use ndarray::{ArrayD, IxDyn};
use tracing::debug;

pub use self::dataset::{Dataset, IdLayer, SharedArray, read_shared, write_shared};
pub use self::sources::{InMemorySource, ProviderCache, ProviderSource};
use crate::errors::{MprError, MprResult};

/// The two provider shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderKind {
    /// 2-D grid; every cell weighs 1.0.
    Raster,
    /// 1-D feature collection with a per-feature size.
    Features { size: ArrayD<f64> },
}

impl ProviderKind {
    fn label(&self) -> &'static str {
        match self {
            ProviderKind::Raster => "raster",
            ProviderKind::Features { .. } => "feature collection",
        }
    }
}

/// Aligned data layers of one spatial domain.
#[derive(Debug, Clone)]
pub struct Provider {
    name: String,
    kind: ProviderKind,
    element_id: IdLayer,
    subunit_id: Option<IdLayer>,
    datasets: BTreeMap<String, Dataset>,
    id_to_name: BTreeMap<i64, String>,
}

impl Provider {
    /// Raster group whose shape is taken from the 2-D element-id grid.
    ///
    /// # Errors
    /// - [`MprError::InvalidLayout`] if `element_id` is not 2-D.
    pub fn raster(
        name: impl Into<String>, element_id: IdLayer, id_to_name: BTreeMap<i64, String>,
    ) -> MprResult<Self> {
        let name = name.into();
        if element_id.shape().len() != 2 {
            return Err(MprError::InvalidLayout {
                provider: name,
                reason: "raster element ids must form a 2-D grid.",
            });
        }
        Ok(Self {
            name,
            kind: ProviderKind::Raster,
            element_id,
            subunit_id: None,
            datasets: BTreeMap::new(),
            id_to_name,
        })
    }

    /// Feature collection with per-feature `size` (area or length).
    ///
    /// # Errors
    /// - [`MprError::InvalidLayout`] if `element_id` is not 1-D.
    /// - [`MprError::ShapeMismatch`] if `size` differs in length.
    pub fn features(
        name: impl Into<String>, element_id: IdLayer, size: Vec<f64>,
        id_to_name: BTreeMap<i64, String>,
    ) -> MprResult<Self> {
        let name = name.into();
        if element_id.shape().len() != 1 {
            return Err(MprError::InvalidLayout {
                provider: name,
                reason: "feature element ids must form a 1-D vector.",
            });
        }
        let size = ArrayD::from_shape_vec(IxDyn(&[size.len()]), size).map_err(|_| {
            MprError::InvalidLayout { provider: name.clone(), reason: "size must be a vector." }
        })?;
        check_shape(&name, "size", &element_id.shape(), size.shape())?;
        Ok(Self {
            name,
            kind: ProviderKind::Features { size },
            element_id,
            subunit_id: None,
            datasets: BTreeMap::new(),
            id_to_name,
        })
    }

    /// Attach the subunit-id layer.
    pub fn with_subunits(mut self, subunit_id: IdLayer) -> MprResult<Self> {
        check_shape(&self.name, "subunit_id", &self.shape(), &subunit_id.shape())?;
        self.subunit_id = Some(subunit_id);
        Ok(self)
    }

    /// Attach a named float dataset.
    pub fn with_dataset(mut self, name: impl Into<String>, dataset: Dataset) -> MprResult<Self> {
        self.publish(name, dataset)?;
        Ok(self)
    }

    /// Add a dataset after construction (preprocessor and sub-regionaliser
    /// outputs).
    ///
    /// # Errors
    /// - [`MprError::ShapeMismatch`] for a foreign shape.
    /// - [`MprError::DatasetExists`] if the name is taken.
    pub fn publish(&mut self, name: impl Into<String>, dataset: Dataset) -> MprResult<()> {
        let name = name.into();
        check_shape(&self.name, &name, &self.shape(), &dataset.shape())?;
        if self.datasets.contains_key(&name) {
            return Err(MprError::DatasetExists { provider: self.name.clone(), dataset: name });
        }
        debug!(provider = %self.name, dataset = %name, "dataset added");
        self.datasets.insert(name, dataset);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    pub fn kind_label(&self) -> &'static str {
        self.kind.label()
    }

    /// Grid `[rows, cols]` or `[n_features]`.
    pub fn shape(&self) -> Vec<usize> {
        self.element_id.shape()
    }

    pub fn element_id(&self) -> &IdLayer {
        &self.element_id
    }

    pub fn subunit_id(&self) -> Option<&IdLayer> {
        self.subunit_id.as_ref()
    }

    pub fn id_to_name(&self) -> &BTreeMap<i64, String> {
        &self.id_to_name
    }

    pub fn datasets(&self) -> &BTreeMap<String, Dataset> {
        &self.datasets
    }

    /// Dataset called `name`.
    ///
    /// # Errors
    /// - [`MprError::MissingDataset`] if absent.
    pub fn dataset(&self, name: &str) -> MprResult<&Dataset> {
        self.datasets.get(name).ok_or_else(|| MprError::MissingDataset {
            provider: self.name.clone(),
            dataset: name.to_string(),
        })
    }

    /// Aggregation weight of every sample: feature size, or 1.0 per cell.
    pub fn weights(&self) -> ArrayD<f64> {
        match &self.kind {
            ProviderKind::Raster => ArrayD::ones(IxDyn(&self.shape())),
            ProviderKind::Features { size } => size.clone(),
        }
    }
}

fn check_shape(provider: &str, layer: &str, expected: &[usize], found: &[usize]) -> MprResult<()> {
    if expected != found {
        return Err(MprError::ShapeMismatch {
            provider: provider.to_string(),
            layer: layer.to_string(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn names() -> BTreeMap<i64, String> {
        BTreeMap::from([(1, "land_a".to_string()), (2, "land_b".to_string())])
    }

    #[test]
    // Purpose
    // -------
    // Layers whose shape conflicts with the element-id grid are a fatal
    // configuration error.
    //
    // Given
    // -----
    // - A 2×2 element-id grid and a 2×3 dataset.
    //
    // Expect
    // ------
    // - `with_dataset` fails with `ShapeMismatch` naming the dataset.
    fn raster_rejects_mismatched_dataset_shape() {
        // Arrange
        let ids = IdLayer::new(arr2(&[[1, 1], [2, 2]]).into_dyn(), -1);
        let provider = Provider::raster("raster_15km", ids, names()).unwrap();
        let clay = Dataset::float(ArrayD::zeros(IxDyn(&[2, 3])));

        // Act
        let err = provider.with_dataset("clay", clay).unwrap_err();

        // Assert
        assert_eq!(
            err,
            MprError::ShapeMismatch {
                provider: "raster_15km".to_string(),
                layer: "clay".to_string(),
                expected: vec![2, 2],
                found: vec![2, 3],
            }
        );
    }

    #[test]
    // Purpose
    // -------
    // Feature collections weigh samples by size, rasters uniformly.
    fn weights_depend_on_provider_kind() {
        let raster_ids = IdLayer::new(arr2(&[[1, 2]]).into_dyn(), -1);
        let raster = Provider::raster("r", raster_ids, names()).unwrap();
        let feature_ids = IdLayer::from_options(&[Some(1), Some(2)]);
        let features = Provider::features("f", feature_ids, vec![2.5, 4.0], names()).unwrap();

        assert_eq!(raster.weights().iter().copied().collect::<Vec<_>>(), vec![1.0, 1.0]);
        assert_eq!(features.weights().iter().copied().collect::<Vec<_>>(), vec![2.5, 4.0]);
    }

    #[test]
    // Purpose
    // -------
    // Missing datasets and duplicate publications are reported by name.
    fn dataset_lookup_and_publish_report_names() {
        let ids = IdLayer::from_options(&[Some(1)]);
        let mut provider = Provider::features("f", ids, vec![1.0], names())
            .unwrap()
            .with_dataset("landuse", Dataset::float(ArrayD::zeros(IxDyn(&[1]))))
            .unwrap();

        let missing = provider.dataset("clay").unwrap_err();
        let taken = provider
            .publish("landuse", Dataset::float(ArrayD::zeros(IxDyn(&[1]))))
            .unwrap_err();

        assert_eq!(
            missing,
            MprError::MissingDataset { provider: "f".to_string(), dataset: "clay".to_string() }
        );
        assert_eq!(
            taken,
            MprError::DatasetExists { provider: "f".to_string(), dataset: "landuse".to_string() }
        );
    }
}
