//! The saga processor: a message-driven state machine over step channels.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use common::ChannelName;
use futures_util::FutureExt;
use tokio::sync::broadcast;
use transport::{MessageHandler, Subscription, Transport};

use crate::command::StepCommand;
use crate::config::{OnExhausted, ProcessorConfig};
use crate::definition::{SagaDefinition, SagaStep};
use crate::envelope::{Payload, SagaEnvelope};
use crate::error::{CommandError, EnvelopeError, Result, SagaError};
use crate::events::SagaEvent;
use crate::state::{Phase, SagaProgress, Transition};

/// Drives saga instances of one definition through their steps.
///
/// The processor subscribes to every step channel and reacts to each
/// envelope it receives:
///
/// - a forward envelope runs the step's forward command, then publishes the
///   next forward envelope (or completes the saga), or on failure starts the
///   rollback at the previous step;
/// - a backward envelope runs the step's compensation, then publishes the
///   backward envelope for the previous step (or finishes the rollback).
///
/// No state is kept between transitions, so several processors can consume
/// the same channels and a restarted processor picks up in-flight sagas from
/// their envelopes.
pub struct SagaProcessor<P, T> {
    core: Arc<ProcessorCore<P, T>>,
    subscriptions: Vec<Subscription>,
}

impl<P, T> SagaProcessor<P, T>
where
    P: Payload,
    T: Transport + 'static,
{
    /// Binds `definition` to `transport`.
    ///
    /// Every step channel is created if absent and then subscribed. If any of
    /// those calls fails, the subscriptions taken so far are released and the
    /// error is returned; no processor exists in that case.
    #[tracing::instrument(skip_all, fields(steps = definition.len()))]
    pub async fn init(
        definition: SagaDefinition<P>,
        transport: Arc<T>,
        config: ProcessorConfig,
    ) -> Result<Self> {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let channels = definition.channels();
        let core = Arc::new(ProcessorCore {
            definition,
            transport,
            config,
            events,
        });

        for channel in &channels {
            core.transport
                .ensure_channel(channel)
                .await
                .map_err(|source| SagaError::TransportInit {
                    channel: channel.clone(),
                    source,
                })?;
        }
        tracing::info!(channels = channels.len(), "saga channels ready");

        let mut subscriptions = Vec::with_capacity(channels.len());
        for channel in &channels {
            let handler: Arc<dyn MessageHandler> = core.clone();
            let subscription = core
                .transport
                .subscribe(channel, handler)
                .await
                .map_err(|source| SagaError::TransportInit {
                    channel: channel.clone(),
                    source,
                })?;
            subscriptions.push(subscription);
        }

        tracing::info!(channels = subscriptions.len(), "saga processor subscribed");
        Ok(Self {
            core,
            subscriptions,
        })
    }

    /// Starts a new saga instance by publishing the envelope for step 0.
    ///
    /// Returns once that envelope is published; the saga itself runs on
    /// the processor's subscriptions.
    #[tracing::instrument(skip(self, payload))]
    pub async fn start(&self, payload: P) -> Result<()> {
        let transition = Transition::start(self.core.definition.len());
        self.core.advance(transition, payload).await?;

        metrics::counter!("saga_started_total").increment(1);
        tracing::info!("saga started");
        Ok(())
    }

    /// Subscribes to the outcome events of every saga run by this processor.
    pub fn events(&self) -> broadcast::Receiver<SagaEvent> {
        self.core.events.subscribe()
    }

    pub fn definition(&self) -> &SagaDefinition<P> {
        &self.core.definition
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.core.config
    }

    /// Stops consuming every step channel and waits for in-progress
    /// handlers to finish.
    ///
    /// Envelopes published after this point stay on their channels for the
    /// next processor.
    pub async fn shutdown(self) {
        for subscription in self.subscriptions {
            subscription.cancel().await;
        }
        tracing::info!("saga processor stopped");
    }
}

struct ProcessorCore<P, T> {
    definition: SagaDefinition<P>,
    transport: Arc<T>,
    config: ProcessorConfig,
    events: broadcast::Sender<SagaEvent>,
}

impl<P, T> ProcessorCore<P, T>
where
    P: Payload,
    T: Transport,
{
    fn emit(&self, event: SagaEvent) {
        // No receivers is fine; outcomes are also logged.
        let _ = self.events.send(event);
    }

    /// Executes a transition: publishes the next envelope or reports the
    /// terminal state.
    async fn advance(&self, transition: Transition, payload: P) -> Result<()> {
        match transition {
            Transition::Completed => {
                metrics::counter!("saga_completed_total").increment(1);
                tracing::info!("saga finished, transaction successful");
                self.emit(SagaEvent::saga_completed());
                Ok(())
            }
            Transition::RolledBack => {
                metrics::counter!("saga_rolled_back_total").increment(1);
                tracing::info!("saga finished, transaction rolled back");
                self.emit(SagaEvent::saga_rolled_back());
                Ok(())
            }
            Transition::Dispatch(progress) => self.dispatch(progress, payload).await,
        }
    }

    async fn dispatch(&self, progress: SagaProgress, payload: P) -> Result<()> {
        let step = self
            .definition
            .step(progress.index)
            .ok_or(EnvelopeError::IndexOutOfRange {
                index: progress.index,
                len: self.definition.len(),
            })?;
        let channel = step.channel();

        let bytes = SagaEnvelope::new(payload, progress).encode()?;
        self.transport
            .publish(channel, bytes)
            .await
            .map_err(|source| SagaError::Publish {
                channel: channel.clone(),
                source,
            })?;

        tracing::debug!(
            %channel,
            index = progress.index,
            phase = %progress.phase,
            "envelope published"
        );
        self.emit(SagaEvent::step_dispatched(channel, progress));
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(%channel))]
    async fn process(&self, channel: &ChannelName, message: &[u8]) {
        let envelope = match SagaEnvelope::<P>::decode(message) {
            Ok(envelope) => envelope,
            Err(e) => return self.reject(channel, e),
        };

        let SagaEnvelope { payload, saga } = envelope;
        let Some(step) = self.definition.step(saga.index) else {
            let err = EnvelopeError::IndexOutOfRange {
                index: saga.index,
                len: self.definition.len(),
            };
            return self.reject(channel, err);
        };

        tracing::debug!(index = saga.index, phase = %saga.phase, "envelope received");

        let next = match saga.phase {
            Phase::Forward => self.run_forward(step, saga.index, payload.clone()).await,
            Phase::Backward => match self.run_compensation(step, saga.index, &payload).await {
                Some(next) => next,
                None => return,
            },
        };

        if let Err(e) = self.advance(next, payload).await {
            let target = match next {
                Transition::Dispatch(progress) => progress,
                _ => saga,
            };
            let target_channel = self
                .definition
                .step(target.index)
                .map_or_else(|| channel.clone(), |step| step.channel().clone());

            metrics::counter!("saga_transition_failures_total").increment(1);
            tracing::error!(
                channel = %target_channel,
                index = target.index,
                phase = %target.phase,
                error = %e,
                "failed to publish next envelope, saga instance stalled"
            );
            self.emit(SagaEvent::transition_failed(
                &target_channel,
                target,
                e.to_string(),
            ));
        }
    }

    fn reject(&self, channel: &ChannelName, error: EnvelopeError) {
        let reason = match &error {
            EnvelopeError::UnrecognizedPhase(_) => "unrecognized saga phase",
            EnvelopeError::IndexOutOfRange { .. } => "step index out of range",
            _ => "malformed envelope",
        };

        metrics::counter!("saga_messages_rejected_total", "channel" => channel.to_string())
            .increment(1);
        tracing::warn!(%channel, error = %error, "{reason}, message dropped");
        self.emit(SagaEvent::message_rejected(channel, error.to_string()));
    }

    async fn run_forward(&self, step: &SagaStep<P>, index: usize, payload: P) -> Transition {
        let channel = step.channel();
        let started = Instant::now();
        let result = execute_guarded(step.forward(), payload).await;
        record_duration(channel, Phase::Forward, started);

        match result {
            Ok(()) => {
                tracing::info!(%channel, index, "saga step succeeded");
                self.emit(SagaEvent::step_succeeded(channel, index));
                Transition::after_success(index, self.definition.len())
            }
            Err(e) => {
                metrics::counter!("saga_step_failures_total", "channel" => channel.to_string())
                    .increment(1);
                tracing::warn!(%channel, index, error = %e, "saga step failed, rolling back");
                self.emit(SagaEvent::step_failed(channel, index, e.to_string()));
                Transition::after_failure(index)
            }
        }
    }

    /// Runs the compensation of `step` under the configured policy.
    ///
    /// Returns the next transition, or `None` if the rollback was halted.
    async fn run_compensation(
        &self,
        step: &SagaStep<P>,
        index: usize,
        payload: &P,
    ) -> Option<Transition> {
        let channel = step.channel();
        let Some(command) = step.compensation() else {
            metrics::counter!(
                "saga_compensation_failures_total",
                "channel" => channel.to_string()
            )
            .increment(1);
            tracing::error!(%channel, index, "no compensation command defined for step");
            self.emit(SagaEvent::compensation_failed(
                channel,
                index,
                "no compensation command defined",
                0,
            ));
            return self.compensation_exhausted(channel, index, "no compensation command defined");
        };

        let policy = &self.config.compensation;
        let attempts = policy.attempts();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let started = Instant::now();
            let result = execute_guarded(command, payload.clone()).await;
            record_duration(channel, Phase::Backward, started);

            match result {
                Ok(()) => {
                    tracing::info!(%channel, index, attempt, "saga step compensated");
                    self.emit(SagaEvent::compensation_succeeded(channel, index));
                    return Some(Transition::after_compensation(index));
                }
                Err(e) => {
                    tracing::warn!(
                        %channel,
                        index,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "compensation attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        metrics::counter!(
            "saga_compensation_failures_total",
            "channel" => channel.to_string()
        )
        .increment(1);
        tracing::error!(
            %channel,
            index,
            attempts,
            error = %last_error,
            "compensation failed on every attempt"
        );
        self.emit(SagaEvent::compensation_failed(
            channel,
            index,
            last_error.clone(),
            attempts,
        ));
        self.compensation_exhausted(channel, index, &last_error)
    }

    fn compensation_exhausted(
        &self,
        channel: &ChannelName,
        index: usize,
        reason: &str,
    ) -> Option<Transition> {
        match self.config.compensation.on_exhausted {
            OnExhausted::Continue => {
                tracing::warn!(%channel, index, "continuing rollback past failed compensation");
                Some(Transition::after_compensation(index))
            }
            OnExhausted::Halt => {
                metrics::counter!("saga_halted_total").increment(1);
                tracing::error!(
                    %channel,
                    index,
                    reason,
                    "saga rollback halted, manual intervention required"
                );
                self.emit(SagaEvent::rollback_halted(channel, index, reason));
                None
            }
        }
    }
}

/// Runs `command`, reporting a panic as an ordinary command failure.
async fn execute_guarded<P: Payload>(
    command: &Arc<dyn StepCommand<P>>,
    payload: P,
) -> std::result::Result<(), CommandError> {
    match AssertUnwindSafe(command.execute(payload)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(CommandError::new(format!(
            "command panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

fn record_duration(channel: &ChannelName, phase: Phase, started: Instant) {
    metrics::histogram!(
        "saga_command_duration_seconds",
        "channel" => channel.to_string(),
        "phase" => phase.as_str()
    )
    .record(started.elapsed().as_secs_f64());
}

#[async_trait]
impl<P, T> MessageHandler for ProcessorCore<P, T>
where
    P: Payload,
    T: Transport + 'static,
{
    async fn handle(&self, channel: &ChannelName, message: &[u8]) {
        self.process(channel, message).await;
    }
}
