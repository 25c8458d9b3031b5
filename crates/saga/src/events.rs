//! Outcome events broadcast by the saga processor.
//!
//! Saga outcomes are otherwise only visible in the logs; subscribers obtained
//! through [`SagaProcessor::events`](crate::SagaProcessor::events) observe
//! every transition the processor makes.

use chrono::{DateTime, Utc};
use common::ChannelName;
use serde::{Deserialize, Serialize};

use crate::state::{Phase, SagaProgress};

/// Events that can occur while a processor drives sagas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// An envelope was published for the next step.
    StepDispatched(DispatchData),

    /// A forward command succeeded.
    StepSucceeded(StepData),

    /// A forward command failed; rollback begins at the previous step.
    StepFailed(StepFailedData),

    /// A compensation command succeeded.
    CompensationSucceeded(StepData),

    /// A compensation could not be completed (failed on every attempt, or
    /// no compensation was defined).
    CompensationFailed(CompensationFailedData),

    /// Every step succeeded (terminal).
    SagaCompleted(TerminalData),

    /// Every reachable step was compensated (terminal).
    SagaRolledBack(TerminalData),

    /// Rollback stopped at a step whose compensation failed (terminal).
    RollbackHalted(HaltedData),

    /// A received message was not a usable envelope and was dropped.
    MessageRejected(RejectedData),

    /// The next envelope could not be published; the instance is stalled.
    TransitionFailed(TransitionFailedData),
}

impl SagaEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::StepDispatched(_) => "StepDispatched",
            SagaEvent::StepSucceeded(_) => "StepSucceeded",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::CompensationSucceeded(_) => "CompensationSucceeded",
            SagaEvent::CompensationFailed(_) => "CompensationFailed",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::SagaRolledBack(_) => "SagaRolledBack",
            SagaEvent::RollbackHalted(_) => "RollbackHalted",
            SagaEvent::MessageRejected(_) => "MessageRejected",
            SagaEvent::TransitionFailed(_) => "TransitionFailed",
        }
    }

    /// Returns true if the event ends a saga instance.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaEvent::SagaCompleted(_)
                | SagaEvent::SagaRolledBack(_)
                | SagaEvent::RollbackHalted(_)
                | SagaEvent::TransitionFailed(_)
        )
    }

    /// Returns the dispatched progress for `StepDispatched` events.
    pub fn dispatched(&self) -> Option<SagaProgress> {
        match self {
            SagaEvent::StepDispatched(data) => Some(SagaProgress {
                index: data.index,
                phase: data.phase,
            }),
            _ => None,
        }
    }

    pub fn step_dispatched(channel: &ChannelName, progress: SagaProgress) -> Self {
        SagaEvent::StepDispatched(DispatchData {
            channel: channel.clone(),
            index: progress.index,
            phase: progress.phase,
        })
    }

    pub fn step_succeeded(channel: &ChannelName, index: usize) -> Self {
        SagaEvent::StepSucceeded(StepData {
            channel: channel.clone(),
            index,
        })
    }

    pub fn step_failed(channel: &ChannelName, index: usize, error: impl Into<String>) -> Self {
        SagaEvent::StepFailed(StepFailedData {
            channel: channel.clone(),
            index,
            error: error.into(),
        })
    }

    pub fn compensation_succeeded(channel: &ChannelName, index: usize) -> Self {
        SagaEvent::CompensationSucceeded(StepData {
            channel: channel.clone(),
            index,
        })
    }

    pub fn compensation_failed(
        channel: &ChannelName,
        index: usize,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        SagaEvent::CompensationFailed(CompensationFailedData {
            channel: channel.clone(),
            index,
            error: error.into(),
            attempts,
        })
    }

    pub fn saga_completed() -> Self {
        SagaEvent::SagaCompleted(TerminalData { at: Utc::now() })
    }

    pub fn saga_rolled_back() -> Self {
        SagaEvent::SagaRolledBack(TerminalData { at: Utc::now() })
    }

    pub fn rollback_halted(channel: &ChannelName, index: usize, reason: impl Into<String>) -> Self {
        SagaEvent::RollbackHalted(HaltedData {
            channel: channel.clone(),
            index,
            reason: reason.into(),
            at: Utc::now(),
        })
    }

    pub fn message_rejected(channel: &ChannelName, reason: impl Into<String>) -> Self {
        SagaEvent::MessageRejected(RejectedData {
            channel: channel.clone(),
            reason: reason.into(),
        })
    }

    pub fn transition_failed(
        channel: &ChannelName,
        progress: SagaProgress,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::TransitionFailed(TransitionFailedData {
            channel: channel.clone(),
            index: progress.index,
            phase: progress.phase,
            error: error.into(),
        })
    }
}

/// Data for StepDispatched event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchData {
    /// Channel the envelope was published to.
    pub channel: ChannelName,
    /// Step index carried by the envelope.
    pub index: usize,
    /// Phase carried by the envelope.
    pub phase: Phase,
}

/// Data for step and compensation success events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    pub channel: ChannelName,
    pub index: usize,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailedData {
    pub channel: ChannelName,
    pub index: usize,
    /// Error message reported by the command.
    pub error: String,
}

/// Data for CompensationFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationFailedData {
    pub channel: ChannelName,
    pub index: usize,
    /// Error message from the last attempt.
    pub error: String,
    /// Attempts made; zero when no compensation was defined.
    pub attempts: u32,
}

/// Data for SagaCompleted and SagaRolledBack events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalData {
    pub at: DateTime<Utc>,
}

/// Data for RollbackHalted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltedData {
    /// Channel of the step whose compensation failed.
    pub channel: ChannelName,
    pub index: usize,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Data for MessageRejected event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedData {
    /// Channel the message arrived on.
    pub channel: ChannelName,
    pub reason: String,
}

/// Data for TransitionFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionFailedData {
    /// Channel the envelope should have been published to.
    pub channel: ChannelName,
    pub index: usize,
    pub phase: Phase,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types() {
        let channel = ChannelName::new("PaymentService");
        assert_eq!(
            SagaEvent::step_dispatched(&channel, SagaProgress::forward(0)).event_type(),
            "StepDispatched"
        );
        assert_eq!(SagaEvent::saga_completed().event_type(), "SagaCompleted");
        assert_eq!(
            SagaEvent::rollback_halted(&channel, 1, "refund failed").event_type(),
            "RollbackHalted"
        );
    }

    #[test]
    fn test_terminal_events() {
        let channel = ChannelName::new("PaymentService");
        assert!(SagaEvent::saga_completed().is_terminal());
        assert!(SagaEvent::saga_rolled_back().is_terminal());
        assert!(SagaEvent::rollback_halted(&channel, 0, "x").is_terminal());
        assert!(!SagaEvent::step_failed(&channel, 0, "x").is_terminal());
        assert!(!SagaEvent::message_rejected(&channel, "x").is_terminal());
    }

    #[test]
    fn test_dispatched_progress() {
        let channel = ChannelName::new("HotelBookingService");
        let event = SagaEvent::step_dispatched(&channel, SagaProgress::backward(1));
        assert_eq!(event.dispatched(), Some(SagaProgress::backward(1)));
        assert_eq!(SagaEvent::saga_completed().dispatched(), None);
    }

    #[test]
    fn test_serialization_is_tagged() {
        let channel = ChannelName::new("FlightBookingService");
        let event = SagaEvent::step_failed(&channel, 0, "sold out");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "StepFailed");
        assert_eq!(json["data"]["channel"], "FlightBookingService");
        assert_eq!(json["data"]["error"], "sold out");

        let back: SagaEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
