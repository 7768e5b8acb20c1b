//! task — one regionaliser → upscaler → transformers chain.
//!
//! A [`Task`] is evaluated in two phases per calibration trial:
//!
//! 1. [`Task::regionalise`]: formula evaluation, masking and upscaling.
//!    It touches only buffers owned by the task and reads the coefficient
//!    registry, so tasks may run this phase concurrently.
//! 2. [`Task::transform`]: writes the upscaled values into the simulation's
//!    element graph; callers run it for one task at a time.
//!
//! [`Task::run`] performs both phases back to back.
use tracing::debug;

use crate::{
    coefficients::{CoefficientId, CoefficientRegistry},
    errors::MprResult,
    provider::Provider,
    regionalisation::Regionaliser,
    simulation::ElementGraph,
    transforming::Transformer,
    upscaling::Upscaler,
};

#[derive(Debug)]
pub struct Task {
    regionaliser: Regionaliser,
    upscaler: Upscaler,
    transformers: Vec<Transformer>,
}

impl Task {
    pub fn new(regionaliser: Regionaliser, upscaler: Upscaler) -> Self {
        Self { regionaliser, upscaler, transformers: Vec::new() }
    }

    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn name(&self) -> &str {
        self.regionaliser.name()
    }

    /// Name of the provider the regionaliser binds to.
    pub fn source(&self) -> &str {
        self.regionaliser.source()
    }

    pub fn coefficients(&self) -> &[CoefficientId] {
        self.regionaliser.coefficients()
    }

    pub fn regionaliser(&self) -> &Regionaliser {
        &self.regionaliser
    }

    pub fn upscaler(&self) -> &Upscaler {
        &self.upscaler
    }

    pub fn transformers(&self) -> &[Transformer] {
        &self.transformers
    }

    /// Activate regionaliser, upscaler and transformers, in that order.
    pub fn activate(&mut self, provider: &Provider, graph: &ElementGraph) -> MprResult<()> {
        self.regionaliser.activate(provider)?;
        self.upscaler.activate(provider, self.regionaliser.mask())?;
        for transformer in &mut self.transformers {
            transformer.activate(graph, &self.upscaler)?;
        }
        debug!(task = self.name(), transformers = self.transformers.len(), "task activated");
        Ok(())
    }

    /// Evaluate, mask and upscale with the current coefficient values.
    pub fn regionalise(&mut self, registry: &CoefficientRegistry) -> MprResult<()> {
        self.regionaliser.apply_coefficients(registry)?;
        self.regionaliser.apply_mask();
        let output = self.regionaliser.output();
        self.upscaler.scale_up(&output)
    }

    /// Write the upscaled values into the element graph.
    pub fn transform(&self, graph: &mut ElementGraph) -> MprResult<()> {
        for transformer in &self.transformers {
            transformer.modify_parameters(graph, &self.upscaler)?;
        }
        Ok(())
    }

    pub fn run(&mut self, registry: &CoefficientRegistry, graph: &mut ElementGraph) -> MprResult<()> {
        self.regionalise(registry)?;
        self.transform(graph)
    }
}
