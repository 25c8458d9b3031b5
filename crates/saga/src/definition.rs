//! The immutable, ordered sequence of saga steps.

use std::collections::HashSet;
use std::sync::Arc;

use common::ChannelName;

use crate::command::StepCommand;

/// One step of a saga, bound to a channel.
pub struct SagaStep<P> {
    channel: ChannelName,
    forward: Arc<dyn StepCommand<P>>,
    compensation: Option<Arc<dyn StepCommand<P>>>,
}

impl<P> SagaStep<P> {
    pub(crate) fn new(
        channel: ChannelName,
        forward: Arc<dyn StepCommand<P>>,
        compensation: Option<Arc<dyn StepCommand<P>>>,
    ) -> Self {
        Self {
            channel,
            forward,
            compensation,
        }
    }

    /// The channel carrying this step's envelopes in both directions.
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    pub fn forward(&self) -> &Arc<dyn StepCommand<P>> {
        &self.forward
    }

    /// The compensating command, if one was attached.
    pub fn compensation(&self) -> Option<&Arc<dyn StepCommand<P>>> {
        self.compensation.as_ref()
    }

    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }
}

impl<P> Clone for SagaStep<P> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            forward: Arc::clone(&self.forward),
            compensation: self.compensation.clone(),
        }
    }
}

impl<P> std::fmt::Debug for SagaStep<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaStep")
            .field("channel", &self.channel)
            .field("has_compensation", &self.compensation.is_some())
            .finish()
    }
}

/// An ordered sequence of steps, indexed `0..len`.
///
/// Index order is the only execution order. A definition always has at
/// least one step and cannot be changed once built.
pub struct SagaDefinition<P> {
    steps: Vec<SagaStep<P>>,
}

impl<P> SagaDefinition<P> {
    pub(crate) fn new(steps: Vec<SagaStep<P>>) -> Self {
        debug_assert!(!steps.is_empty());
        Self { steps }
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false: a definition has at least one step.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the step at `index`.
    pub fn step(&self, index: usize) -> Option<&SagaStep<P>> {
        self.steps.get(index)
    }

    /// Iterates over the steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &SagaStep<P>> {
        self.steps.iter()
    }

    /// Returns the distinct channel names in order of first use.
    ///
    /// Several steps may share a channel; envelopes carry the step index, so
    /// one subscription per channel is enough.
    pub fn channels(&self) -> Vec<ChannelName> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .filter(|step| seen.insert(step.channel.clone()))
            .map(|step| step.channel.clone())
            .collect()
    }
}

impl<P> Clone for SagaDefinition<P> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

impl<P> std::fmt::Debug for SagaDefinition<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaDefinition")
            .field("steps", &self.steps)
            .finish()
    }
}
