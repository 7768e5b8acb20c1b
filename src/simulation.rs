//! simulation — contract of the downstream simulation model.
//!
//! Purpose
//! -------
//! Describe what the calibration loop needs from the process model it
//! parameterises, without implementing one: a snapshot of the model's
//! conditions that can be saved and restored, a `simulate` call, and an
//! object graph of elements whose models expose named parameters.
//!
//! Key behaviors
//! -------------
//! - [`Simulation`] is implemented by the caller's model wrapper.
//! - [`ElementGraph`] maps element names to a [`ModelNode`]; a node carries
//!   a model-type name, a parameter namespace, and submodels, searched
//!   depth-first by transformers.
//! - [`Parameter`] holds one value (element level) or one value per
//!   subunit position.
//!
//! Invariants & assumptions
//! ------------------------
//! - Conditions are plain data (`Clone`); restoring them must bring the
//!   model back to exactly the state captured at calibrator activation.
//! - The element graph's structure is fixed after activation; only
//!   parameter values change.
use std::collections::BTreeMap;

use crate::errors::{MprError, MprResult};

/// Process model driven by the calibrator.
pub trait Simulation: Send {
    /// Snapshot of initial conditions (states, logs) restored before every
    /// trial.
    type Conditions: Clone + Send;

    fn conditions(&self) -> Self::Conditions;

    fn set_conditions(&mut self, conditions: Self::Conditions);

    /// Run the simulation period to completion.
    fn simulate(&mut self) -> MprResult<()>;

    fn elements(&self) -> &ElementGraph;

    fn elements_mut(&mut self) -> &mut ElementGraph;
}

/// Parameter values of one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    values: Vec<f64>,
}

impl Parameter {
    pub fn scalar(value: f64) -> Self {
        Self { values: vec![value] }
    }

    /// One value per subunit position.
    pub fn vector(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// First value; the value of a scalar parameter.
    pub fn value(&self) -> f64 {
        self.values.first().copied().unwrap_or(f64::NAN)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Broadcast `value` to every position.
    pub fn set_value(&mut self, value: f64) {
        self.values.fill(value);
    }

    /// Overwrite position `index`; returns `false` if out of range.
    pub fn set_at(&mut self, index: usize, value: f64) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// A model instance with its parameters and submodels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelNode {
    name: String,
    parameters: BTreeMap<String, Parameter>,
    submodels: Vec<ModelNode>,
}

impl ModelNode {
    /// Model of type `name` without parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, parameter: Parameter) -> Self {
        self.parameters.insert(name.into(), parameter);
        self
    }

    pub fn with_submodel(mut self, submodel: ModelNode) -> Self {
        self.submodels.push(submodel);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.get_mut(name)
    }

    pub fn submodels(&self) -> &[ModelNode] {
        &self.submodels
    }

    /// Depth-first path (submodel positions) to the first node that is of
    /// type `model` (any type if `None`) and defines `parameter`.
    pub fn find(&self, model: Option<&str>, parameter: &str) -> Option<Vec<usize>> {
        let matches = model.is_none_or(|m| m == self.name);
        if matches && self.parameters.contains_key(parameter) {
            return Some(Vec::new());
        }
        self.submodels.iter().enumerate().find_map(|(i, sub)| {
            let mut path = sub.find(model, parameter)?;
            path.insert(0, i);
            Some(path)
        })
    }

    /// Node at `path`.
    pub fn node(&self, path: &[usize]) -> Option<&ModelNode> {
        path.iter().try_fold(self, |node, &i| node.submodels.get(i))
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<&mut ModelNode> {
        path.iter().try_fold(self, |node, &i| node.submodels.get_mut(i))
    }
}

/// Element name → main model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementGraph {
    elements: BTreeMap<String, ModelNode>,
}

impl ElementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, name: impl Into<String>, model: ModelNode) -> Self {
        self.elements.insert(name.into(), model);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, model: ModelNode) {
        self.elements.insert(name.into(), model);
    }

    pub fn get(&self, element: &str) -> Option<&ModelNode> {
        self.elements.get(element)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelNode)> {
        self.elements.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Parameter `name` of the node at `path` below `element`.
    pub fn parameter(&self, element: &str, path: &[usize], name: &str) -> MprResult<&Parameter> {
        self.elements
            .get(element)
            .and_then(|node| node.node(path))
            .and_then(|node| node.parameter(name))
            .ok_or_else(|| vanished(element, name))
    }

    pub fn parameter_mut(
        &mut self, element: &str, path: &[usize], name: &str,
    ) -> MprResult<&mut Parameter> {
        self.elements
            .get_mut(element)
            .and_then(|node| node.node_mut(path))
            .and_then(|node| node.parameter_mut(name))
            .ok_or_else(|| vanished(element, name))
    }
}

fn vanished(element: &str, parameter: &str) -> MprError {
    MprError::InvalidParameter {
        element: element.to_string(),
        parameter: parameter.to_string(),
        reason: "the parameter is no longer reachable in the element graph.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn land() -> ModelNode {
        ModelNode::new("hland_96")
            .with_parameter("fc", Parameter::vector(vec![100.0, 100.0]))
            .with_submodel(
                ModelNode::new("ga_garto").with_parameter("sand", Parameter::scalar(0.0)),
            )
    }

    #[test]
    // Purpose
    // -------
    // Parameters are located depth-first, optionally filtered by model
    // type.
    //
    // Given
    // -----
    // - A main model `hland_96` with a `ga_garto` submodel.
    //
    // Expect
    // ------
    // - `fc` at the root, `sand` at submodel 0, a wrong model type yields
    //   nothing.
    fn find_searches_submodels_depth_first() {
        let node = land();

        assert_eq!(node.find(None, "fc"), Some(vec![]));
        assert_eq!(node.find(Some("ga_garto"), "sand"), Some(vec![0]));
        assert_eq!(node.find(Some("hland_96"), "sand"), None);
        assert_eq!(node.find(None, "beta"), None);
    }

    #[test]
    // Purpose
    // -------
    // Scalar writes broadcast; positional writes respect the length.
    fn parameter_writes() {
        let mut parameter = Parameter::vector(vec![1.0, 2.0, 3.0]);

        parameter.set_value(4.0);
        let inside = parameter.set_at(2, 9.0);
        let outside = parameter.set_at(3, 9.0);

        assert_eq!(parameter.values(), &[4.0, 4.0, 9.0]);
        assert!(inside);
        assert!(!outside);
    }

    #[test]
    // Purpose
    // -------
    // Graph lookups reach nested parameters and report unreachable ones.
    fn graph_parameter_lookup() {
        let mut graph = ElementGraph::new().with_element("land_a", land());

        graph.parameter_mut("land_a", &[0], "sand").unwrap().set_value(0.3);
        let err = graph.parameter("land_b", &[], "fc").unwrap_err();

        assert_eq!(graph.parameter("land_a", &[0], "sand").unwrap().value(), 0.3);
        assert!(matches!(err, MprError::InvalidParameter { .. }));
    }
}
