//! Element- and subunit-level upscalers.
//!
//! Purpose
//! -------
//! Reduce the masked output of one regionaliser to one value per simulation
//! element, or one value per `(element, subunit)` pair.
//!
//! Key behaviors
//! -------------
//! - [`Upscaler::activate`] fixes the key set once: the element ids of the
//!   provider's id-to-name table (element level), or every
//!   `(element, subunit)` pair occurring at a cell with valid ids and a
//!   known element (subunit level). It also groups the cells where the
//!   regionaliser mask and the id layers are valid, using
//!   [`Groups`](super::grouping::Groups).
//! - [`Upscaler::scale_up`] overwrites the value of every key from the
//!   current regionaliser output. Keys without grouped cells yield NaN.
//!
//! Invariants & assumptions
//! ------------------------
//! - Values are stored in a flat vector of *slots*. Slots are sorted by
//!   element id and, inside one element, by subunit id, so the subunit
//!   values of an element are contiguous.
//! - The slot layout never changes after activation; only values do.
//!
//! Conventions
//! -----------
//! - Subunit ids are positions in the target parameter's value vector;
//!   interpreting them is left to the transformer.
use std::{borrow::Cow, collections::BTreeMap, ops::Range};

use ndarray::{ArrayD, Zip};
use tracing::debug;

use crate::{
    errors::{MprError, MprResult},
    provider::Provider,
    upscaling::{aggregators::Aggregator, grouping::Groups},
};

/// Spatial granularity of an upscaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Element,
    Subunit,
}

impl Level {
    pub fn label(self) -> &'static str {
        match self {
            Level::Element => "element",
            Level::Subunit => "subunit",
        }
    }
}

#[derive(Debug, Clone)]
struct Layout {
    element_ids: Vec<i64>,
    element_names: Vec<String>,
    element_slots: Vec<Range<usize>>,
    subunits: Vec<i64>,
    groups: Groups<usize>,
    weights: Vec<f64>,
    mask: ArrayD<bool>,
}

/// Aggregates a regionaliser output onto elements or element subunits.
#[derive(Debug, Clone)]
pub struct Upscaler {
    level: Level,
    aggregator: Aggregator,
    layout: Option<Layout>,
    values: Vec<f64>,
}

impl Upscaler {
    pub fn element(aggregator: Aggregator) -> Self {
        Self { level: Level::Element, aggregator, layout: None, values: Vec::new() }
    }

    pub fn subunit(aggregator: Aggregator) -> Self {
        Self { level: Level::Subunit, aggregator, layout: None, values: Vec::new() }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Fix the key set and group the valid cells.
    ///
    /// `mask` is the mask of the bound regionaliser.
    ///
    /// # Errors
    /// - [`MprError::MissingSubunits`] for a subunit-level upscaler on a
    ///   provider without subunit ids.
    pub fn activate(&mut self, provider: &Provider, mask: &ArrayD<bool>) -> MprResult<()> {
        let element_ids: Vec<i64> = provider.id_to_name().keys().copied().collect();
        let element_names: Vec<String> = provider.id_to_name().values().cloned().collect();
        let ids = provider.element_id();

        let mut valid = ids.mask().clone();
        Zip::from(&mut valid).and(ids.values()).for_each(|v, id| {
            *v &= provider.id_to_name().contains_key(id);
        });

        let (element_slots, subunits, keys): (Vec<Range<usize>>, Vec<i64>, Vec<(i64, i64)>) =
            match self.level {
                Level::Element => {
                    let slots = (0..element_ids.len()).map(|i| i..i + 1).collect();
                    (slots, Vec::new(), ids.values().iter().map(|&e| (e, 0)).collect())
                }
                Level::Subunit => {
                    let sub = provider.subunit_id().ok_or_else(|| MprError::MissingSubunits {
                        provider: provider.name().to_string(),
                    })?;
                    Zip::from(&mut valid).and(sub.mask()).for_each(|v, &m| *v &= m);
                    let keys: Vec<(i64, i64)> =
                        ids.values().iter().copied().zip(sub.values().iter().copied()).collect();
                    let mut pairs: Vec<(i64, i64)> =
                        keys.iter().zip(valid.iter()).filter(|(_, v)| **v).map(|(&k, _)| k).collect();
                    pairs.sort_unstable();
                    pairs.dedup();
                    let slots = element_ids
                        .iter()
                        .map(|e| {
                            let start = pairs.partition_point(|p| p.0 < *e);
                            let end = pairs.partition_point(|p| p.0 <= *e);
                            start..end
                        })
                        .collect();
                    let subunits = pairs.iter().map(|p| p.1).collect();
                    (slots, subunits, keys)
                }
            };

        let mut upscale_mask = valid;
        Zip::from(&mut upscale_mask).and(mask).for_each(|v, &m| *v &= m);

        let pairs = keys
            .iter()
            .zip(upscale_mask.iter())
            .enumerate()
            .filter(|(_, (_, m))| **m)
            .filter_map(|(cell, (&(element, subunit), _))| {
                let e = element_ids.binary_search(&element).ok()?;
                let slot = match self.level {
                    Level::Element => e,
                    Level::Subunit => {
                        let range = element_slots[e].clone();
                        range.start + subunits[range].binary_search(&subunit).ok()?
                    }
                };
                Some((slot, cell))
            })
            .collect();
        let groups = Groups::build(pairs);

        let nmb_slots = match self.level {
            Level::Element => element_ids.len(),
            Level::Subunit => subunits.len(),
        };
        debug!(
            provider = provider.name(),
            level = self.level.label(),
            aggregator = self.aggregator.label(),
            keys = nmb_slots,
            cells = groups.nmb_members(),
            "upscaler activated"
        );
        self.values = vec![f64::NAN; nmb_slots];
        self.layout = Some(Layout {
            element_ids,
            element_names,
            element_slots,
            subunits,
            groups,
            weights: provider.weights().iter().copied().collect(),
            mask: upscale_mask,
        });
        Ok(())
    }

    /// Recompute every value from `output`, the regionaliser output.
    ///
    /// # Errors
    /// - [`MprError::NotActivated`] before [`Upscaler::activate`].
    pub fn scale_up(&mut self, output: &ArrayD<f64>) -> MprResult<()> {
        let layout = self.layout.as_ref().ok_or(MprError::NotActivated { component: "Upscaler" })?;
        let flat: Cow<'_, [f64]> = match output.as_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(output.iter().copied().collect()),
        };
        let mut samples = Vec::new();
        let mut weights = Vec::new();
        for (slot, value) in self.values.iter_mut().enumerate() {
            samples.clear();
            weights.clear();
            for &cell in layout.groups.get(slot) {
                samples.push(flat[cell]);
                weights.push(layout.weights[cell]);
            }
            *value = self.aggregator.aggregate(&samples, &weights);
        }
        Ok(())
    }

    /// Cells contributing to the aggregation (regionaliser mask ∩ id
    /// validity).
    pub fn mask(&self) -> Option<&ArrayD<bool>> {
        self.layout.as_ref().map(|l| &l.mask)
    }

    /// Element names in id order.
    pub fn element_names(&self) -> &[String] {
        self.layout.as_ref().map_or(&[], |l| l.element_names.as_slice())
    }

    /// Position of element `name`, stable for the lifetime of the layout.
    pub fn element_index(&self, name: &str) -> Option<usize> {
        self.layout.as_ref()?.element_names.iter().position(|n| n == name)
    }

    /// Value of the element at `index` (element level).
    pub fn element_value(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(f64::NAN)
    }

    /// Subunit ids and values of the element at `index` (subunit level).
    pub fn subunit_values(&self, index: usize) -> (&[i64], &[f64]) {
        match &self.layout {
            Some(l) if self.level == Level::Subunit => match l.element_slots.get(index) {
                Some(range) => (&l.subunits[range.clone()], &self.values[range.clone()]),
                None => (&[], &[]),
            },
            _ => (&[], &[]),
        }
    }

    /// Element id → value (element level).
    pub fn id_to_value(&self) -> BTreeMap<i64, f64> {
        match &self.layout {
            Some(l) if self.level == Level::Element => {
                l.element_ids.iter().copied().zip(self.values.iter().copied()).collect()
            }
            _ => BTreeMap::new(),
        }
    }

    /// Element id → subunit id → value (subunit level).
    pub fn id_to_idx_to_value(&self) -> BTreeMap<i64, BTreeMap<i64, f64>> {
        match &self.layout {
            Some(l) if self.level == Level::Subunit => l
                .element_ids
                .iter()
                .enumerate()
                .map(|(e, &id)| {
                    let (subs, values) = self.subunit_values(e);
                    (id, subs.iter().copied().zip(values.iter().copied()).collect())
                })
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Element name → value (element level).
    pub fn name_to_value(&self) -> BTreeMap<String, f64> {
        match &self.layout {
            Some(l) if self.level == Level::Element => {
                l.element_names.iter().cloned().zip(self.values.iter().copied()).collect()
            }
            _ => BTreeMap::new(),
        }
    }

    /// Element name → subunit id → value (subunit level).
    pub fn name_to_idx_to_value(&self) -> BTreeMap<String, BTreeMap<i64, f64>> {
        match &self.layout {
            Some(l) if self.level == Level::Subunit => l
                .element_names
                .iter()
                .enumerate()
                .map(|(e, name)| {
                    let (subs, values) = self.subunit_values(e);
                    (name.clone(), subs.iter().copied().zip(values.iter().copied()).collect())
                })
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    pub fn is_activated(&self) -> bool {
        self.layout.is_some()
    }
}
