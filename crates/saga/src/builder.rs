//! Fluent construction of saga definitions.
//!
//! The builder is split into two types so that commands can only be attached
//! once a step has been opened:
//!
//! - [`SagaDefinitionBuilder`] has no open step and only offers
//!   [`step`](SagaDefinitionBuilder::step).
//! - [`StepBuilder`] is scoped to the most recently opened step and offers
//!   [`on_reply`](StepBuilder::on_reply),
//!   [`with_compensation`](StepBuilder::with_compensation), the next
//!   [`step`](StepBuilder::step) and the `build` methods.
//!
//! Attaching a command before any step is opened does not compile:
//!
//! ```compile_fail
//! use saga::{CommandError, SagaDefinitionBuilder, command_fn};
//!
//! let builder = SagaDefinitionBuilder::<u64>::new()
//!     .on_reply(command_fn(|_: u64| async { Ok::<(), CommandError>(()) }));
//! ```
//!
//! ```compile_fail
//! use saga::{CommandError, SagaDefinitionBuilder, command_fn};
//!
//! let builder = SagaDefinitionBuilder::<u64>::new()
//!     .with_compensation(command_fn(|_: u64| async { Ok::<(), CommandError>(()) }))
//!     .step("FlightBookingService");
//! ```

use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use common::ChannelName;
use transport::Transport;

use crate::command::StepCommand;
use crate::config::ProcessorConfig;
use crate::definition::{SagaDefinition, SagaStep};
use crate::envelope::Payload;
use crate::error::{Result, SagaError};
use crate::processor::SagaProcessor;

struct PendingStep<P> {
    channel: ChannelName,
    forward: Option<Arc<dyn StepCommand<P>>>,
    compensation: Option<Arc<dyn StepCommand<P>>>,
}

impl<P> PendingStep<P> {
    fn open(channel: ChannelName) -> Self {
        Self {
            channel,
            forward: None,
            compensation: None,
        }
    }

    fn finish(self, index: usize) -> Result<SagaStep<P>> {
        let forward = self
            .forward
            .ok_or_else(|| SagaError::MissingForwardCommand {
                index,
                channel: self.channel.clone(),
            })?;
        Ok(SagaStep::new(self.channel, forward, self.compensation))
    }
}

/// Entry point for describing a saga: no step is open yet.
///
/// ```
/// use saga::{CommandError, SagaDefinitionBuilder, command_fn};
///
/// let definition = SagaDefinitionBuilder::<u64>::new()
///     .step("FlightBookingService")
///     .on_reply(command_fn(|_trip: u64| async { Ok::<(), CommandError>(()) }))
///     .with_compensation(command_fn(|_trip: u64| async { Ok::<(), CommandError>(()) }))
///     .step("PaymentService")
///     .on_reply(command_fn(|_trip: u64| async { Ok::<(), CommandError>(()) }))
///     .into_definition()
///     .unwrap();
///
/// assert_eq!(definition.len(), 2);
/// ```
pub struct SagaDefinitionBuilder<P> {
    _payload: PhantomData<fn(P)>,
}

impl<P> SagaDefinitionBuilder<P> {
    pub fn new() -> Self {
        Self {
            _payload: PhantomData,
        }
    }

    /// Opens the first step, bound to `channel`.
    pub fn step(self, channel: impl Into<ChannelName>) -> StepBuilder<P> {
        StepBuilder {
            finished: Vec::new(),
            current: PendingStep::open(channel.into()),
        }
    }
}

impl<P> Default for SagaDefinitionBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder scoped to the most recently opened step.
pub struct StepBuilder<P> {
    finished: Vec<PendingStep<P>>,
    current: PendingStep<P>,
}

impl<P> StepBuilder<P> {
    /// Attaches the forward command to the open step, replacing any earlier one.
    pub fn on_reply(mut self, command: impl StepCommand<P> + 'static) -> Self {
        self.current.forward = Some(Arc::new(command));
        self
    }

    /// Attaches the compensation command to the open step, replacing any
    /// earlier one.
    pub fn with_compensation(mut self, command: impl StepCommand<P> + 'static) -> Self {
        self.current.compensation = Some(Arc::new(command));
        self
    }

    /// Closes the open step and opens the next one, bound to `channel`.
    pub fn step(mut self, channel: impl Into<ChannelName>) -> Self {
        let previous = mem::replace(&mut self.current, PendingStep::open(channel.into()));
        self.finished.push(previous);
        self
    }

    /// Finalizes the steps into an immutable definition.
    ///
    /// Fails with [`SagaError::MissingForwardCommand`] if a step was never
    /// given a forward command.
    pub fn into_definition(self) -> Result<SagaDefinition<P>> {
        let steps = self
            .finished
            .into_iter()
            .chain(std::iter::once(self.current))
            .enumerate()
            .map(|(index, pending)| pending.finish(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(SagaDefinition::new(steps))
    }
}

impl<P: Payload> StepBuilder<P> {
    /// Builds the definition and starts a processor over `transport` with
    /// the default configuration.
    pub async fn build<T>(self, transport: Arc<T>) -> Result<SagaProcessor<P, T>>
    where
        T: Transport + 'static,
    {
        self.build_with_config(transport, ProcessorConfig::default())
            .await
    }

    /// Builds the definition and starts a processor over `transport`.
    ///
    /// The processor is returned only once every step channel exists and is
    /// subscribed.
    pub async fn build_with_config<T>(
        self,
        transport: Arc<T>,
        config: ProcessorConfig,
    ) -> Result<SagaProcessor<P, T>>
    where
        T: Transport + 'static,
    {
        let definition = self.into_definition()?;
        SagaProcessor::init(definition, transport, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::command_fn;
    use crate::error::CommandError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ok() -> impl StepCommand<u64> {
        command_fn(|_: u64| async { Ok::<(), CommandError>(()) })
    }

    fn counting(counter: Arc<AtomicUsize>) -> impl StepCommand<u64> {
        command_fn(move |_: u64| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), CommandError>(())
            }
        })
    }

    #[test]
    fn test_steps_in_declaration_order() {
        let definition = SagaDefinitionBuilder::<u64>::new()
            .step("FlightBookingService")
            .on_reply(ok())
            .with_compensation(ok())
            .step("HotelBookingService")
            .on_reply(ok())
            .with_compensation(ok())
            .step("PaymentService")
            .on_reply(ok())
            .into_definition()
            .unwrap();

        let channels: Vec<_> = definition
            .steps()
            .map(|step| step.channel().as_str().to_string())
            .collect();
        assert_eq!(
            channels,
            vec!["FlightBookingService", "HotelBookingService", "PaymentService"]
        );
        assert!(definition.step(0).unwrap().has_compensation());
        assert!(!definition.step(2).unwrap().has_compensation());
    }

    #[tokio::test]
    async fn test_commands_attach_to_most_recent_step() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let definition = SagaDefinitionBuilder::<u64>::new()
            .step("a")
            .on_reply(counting(Arc::clone(&first)))
            .step("b")
            .on_reply(counting(Arc::clone(&second)))
            .with_compensation(ok())
            .into_definition()
            .unwrap();

        definition.step(1).unwrap().forward().execute(1).await.unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert!(!definition.step(0).unwrap().has_compensation());
        assert!(definition.step(1).unwrap().has_compensation());
    }

    #[tokio::test]
    async fn test_attaching_twice_replaces_the_command() {
        let replaced = Arc::new(AtomicUsize::new(0));
        let kept = Arc::new(AtomicUsize::new(0));

        let definition = SagaDefinitionBuilder::<u64>::new()
            .step("a")
            .on_reply(counting(Arc::clone(&replaced)))
            .on_reply(counting(Arc::clone(&kept)))
            .into_definition()
            .unwrap();

        definition.step(0).unwrap().forward().execute(1).await.unwrap();
        assert_eq!(replaced.load(Ordering::SeqCst), 0);
        assert_eq!(kept.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_forward_command_fails() {
        let result = SagaDefinitionBuilder::<u64>::new()
            .step("FlightBookingService")
            .on_reply(ok())
            .step("HotelBookingService")
            .with_compensation(ok())
            .into_definition();

        match result {
            Err(SagaError::MissingForwardCommand { index, channel }) => {
                assert_eq!(index, 1);
                assert_eq!(channel.as_str(), "HotelBookingService");
            }
            other => panic!("expected MissingForwardCommand, got {other:?}"),
        }
    }
}
