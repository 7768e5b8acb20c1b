//! transforming — writing upscaled values into simulation parameters.
//!
//! Purpose
//! -------
//! Bind the per-element (or per-subunit) values of an upscaler to one named
//! parameter of the simulation's models and write them on every trial.
//!
//! Key behaviors
//! -------------
//! - [`Transformer::activate`] resolves, once, element name → parameter
//!   address: elements outside the optional selection, elements whose model
//!   tree lacks the parameter (or the requested model type), and elements
//!   unknown to the upscaler are skipped silently.
//! - [`Transformer::modify_parameters`] hands every resolved parameter and
//!   its current value(s) to an [`ElementTransform`] or
//!   [`SubunitTransform`].
//! - [`Identity`] writes values unchanged and skips NaN, leaving the
//!   previous parameter value in place.
//!
//! Invariants & assumptions
//! ------------------------
//! - Transformer and upscaler work on the same level; a mismatch is a
//!   configuration error at activation.
//! - Subunit ids are 0-based positions in the parameter's value vector and
//!   are validated against its length at activation.
use std::{collections::BTreeSet, fmt};

use tracing::debug;

use crate::{
    errors::{MprError, MprResult},
    simulation::{ElementGraph, Parameter},
    upscaling::{Level, Upscaler},
};

/// Element-level parameter modification.
pub trait ElementTransform: Send + Sync {
    fn modify_parameter(&self, parameter: &mut Parameter, value: f64);
}

/// Subunit-level parameter modification; `subunits[i]` is the position of
/// `values[i]`.
pub trait SubunitTransform: Send + Sync {
    fn modify_parameter(&self, parameter: &mut Parameter, subunits: &[i64], values: &[f64]);
}

impl<F> ElementTransform for F
where
    F: Fn(&mut Parameter, f64) + Send + Sync,
{
    fn modify_parameter(&self, parameter: &mut Parameter, value: f64) {
        self(parameter, value)
    }
}

/// Writes values unchanged, skipping NaN.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl ElementTransform for Identity {
    fn modify_parameter(&self, parameter: &mut Parameter, value: f64) {
        if !value.is_nan() {
            parameter.set_value(value);
        }
    }
}

impl SubunitTransform for Identity {
    fn modify_parameter(&self, parameter: &mut Parameter, subunits: &[i64], values: &[f64]) {
        for (&idx, &value) in subunits.iter().zip(values) {
            if !value.is_nan() {
                if let Ok(idx) = usize::try_from(idx) {
                    parameter.set_at(idx, value);
                }
            }
        }
    }
}

enum TransformKind {
    Element(Box<dyn ElementTransform>),
    Subunit(Box<dyn SubunitTransform>),
}

impl TransformKind {
    fn level(&self) -> Level {
        match self {
            TransformKind::Element(_) => Level::Element,
            TransformKind::Subunit(_) => Level::Subunit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Target {
    element: String,
    path: Vec<usize>,
    index: usize,
}

/// Writes upscaled values into one parameter of the simulation models.
pub struct Transformer {
    parameter: String,
    model: Option<String>,
    selection: Option<BTreeSet<String>>,
    kind: TransformKind,
    targets: Vec<Target>,
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("parameter", &self.parameter)
            .field("model", &self.model)
            .field("selection", &self.selection)
            .field("level", &self.kind.level())
            .field("targets", &self.targets.len())
            .finish()
    }
}

impl Transformer {
    /// Element-level transformer for parameter `parameter`.
    pub fn element(parameter: impl Into<String>, transform: impl ElementTransform + 'static) -> Self {
        Self::with_kind(parameter.into(), TransformKind::Element(Box::new(transform)))
    }

    /// Subunit-level transformer for parameter `parameter`.
    pub fn subunit(parameter: impl Into<String>, transform: impl SubunitTransform + 'static) -> Self {
        Self::with_kind(parameter.into(), TransformKind::Subunit(Box::new(transform)))
    }

    fn with_kind(parameter: String, kind: TransformKind) -> Self {
        Self { parameter, model: None, selection: None, kind, targets: Vec::new() }
    }

    /// Only modify models of type `model`.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Only modify the given elements.
    pub fn with_selection<I, S>(mut self, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = Some(elements.into_iter().map(Into::into).collect());
        self
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn level(&self) -> Level {
        self.kind.level()
    }

    /// Resolve the target parameter of every relevant element.
    ///
    /// # Errors
    /// - [`MprError::LevelMismatch`] if `upscaler` works on the other level.
    /// - [`MprError::SubunitIndexOutOfRange`] if a subunit id cannot address
    ///   the target parameter.
    pub fn activate(&mut self, graph: &ElementGraph, upscaler: &Upscaler) -> MprResult<()> {
        if upscaler.level() != self.level() {
            return Err(MprError::LevelMismatch {
                transformer: self.parameter.clone(),
                expected: self.level().label(),
                found: upscaler.level().label(),
            });
        }
        let mut targets = Vec::new();
        for (element, node) in graph.iter() {
            if self.selection.as_ref().is_some_and(|s| !s.contains(element)) {
                continue;
            }
            let Some(path) = node.find(self.model.as_deref(), &self.parameter) else {
                continue;
            };
            let Some(index) = upscaler.element_index(element) else {
                continue;
            };
            if self.level() == Level::Subunit {
                let len = graph.parameter(element, &path, &self.parameter)?.len();
                let (subunits, _) = upscaler.subunit_values(index);
                if let Some(&bad) = subunits.iter().find(|&&s| s < 0 || s as usize >= len) {
                    return Err(MprError::SubunitIndexOutOfRange {
                        element: element.to_string(),
                        parameter: self.parameter.clone(),
                        index: bad,
                        len,
                    });
                }
            }
            targets.push(Target { element: element.to_string(), path, index });
        }
        debug!(
            parameter = %self.parameter,
            level = self.level().label(),
            targets = targets.len(),
            "transformer activated"
        );
        self.targets = targets;
        Ok(())
    }

    /// Write the current upscaled values into every resolved parameter.
    pub fn modify_parameters(&self, graph: &mut ElementGraph, upscaler: &Upscaler) -> MprResult<()> {
        for target in &self.targets {
            let parameter = graph.parameter_mut(&target.element, &target.path, &self.parameter)?;
            match &self.kind {
                TransformKind::Element(t) => {
                    t.modify_parameter(parameter, upscaler.element_value(target.index))
                }
                TransformKind::Subunit(t) => {
                    let (subunits, values) = upscaler.subunit_values(target.index);
                    t.modify_parameter(parameter, subunits, values)
                }
            }
        }
        Ok(())
    }

    /// `(element, model path)` of every resolved target.
    pub fn targets(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.targets.iter().map(|t| (t.element.as_str(), t.path.as_slice()))
    }
}
