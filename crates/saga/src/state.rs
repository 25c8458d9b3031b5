//! Saga progress and the pure state transitions between steps.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Direction of travel through the saga.
///
/// The phase decides which command of the addressed step runs when an
/// envelope is received: the forward command or the compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Executing steps in definition order.
    #[serde(rename = "STEP_FORWARD")]
    Forward,

    /// Compensating completed steps in reverse order.
    #[serde(rename = "STEP_BACKWARD")]
    Backward,
}

impl Phase {
    /// Returns the wire name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Forward => "STEP_FORWARD",
            Phase::Backward => "STEP_BACKWARD",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Phase {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STEP_FORWARD" => Ok(Phase::Forward),
            "STEP_BACKWARD" => Ok(Phase::Backward),
            other => Err(EnvelopeError::UnrecognizedPhase(other.to_string())),
        }
    }
}

/// Position of a saga instance: which step to run, in which direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SagaProgress {
    /// Index of the step in the saga definition.
    pub index: usize,
    /// Direction of travel.
    pub phase: Phase,
}

impl SagaProgress {
    /// Progress that runs the forward command of step `index`.
    pub fn forward(index: usize) -> Self {
        Self {
            index,
            phase: Phase::Forward,
        }
    }

    /// Progress that runs the compensation of step `index`.
    pub fn backward(index: usize) -> Self {
        Self {
            index,
            phase: Phase::Backward,
        }
    }
}

/// The outcome of a state transition.
///
/// ```text
/// start ──► (0, F) ──ok──► (1, F) ──ok──► … ──ok──► Completed
///             │              │
///            err            err
///             ▼              ▼
///        RolledBack ◄──── (0, B) ◄── (i-1, B) ◄── …
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Publish an envelope for the given progress.
    Dispatch(SagaProgress),

    /// Every forward command succeeded (terminal state).
    Completed,

    /// Every reachable step was compensated (terminal state).
    RolledBack,
}

impl Transition {
    /// Moves forward to step `index`, completing the saga once `index`
    /// runs past the last of `len` steps.
    pub fn forward_to(index: usize, len: usize) -> Self {
        if index >= len {
            Transition::Completed
        } else {
            Transition::Dispatch(SagaProgress::forward(index))
        }
    }

    /// Moves backward to the step before `index`, finishing the rollback
    /// when there is none.
    pub fn backward_from(index: usize) -> Self {
        match index.checked_sub(1) {
            Some(previous) => Transition::Dispatch(SagaProgress::backward(previous)),
            None => Transition::RolledBack,
        }
    }

    /// The transition that starts a new saga instance of `len` steps.
    pub fn start(len: usize) -> Self {
        Self::forward_to(0, len)
    }

    /// The transition after the forward command of step `index` succeeded.
    pub fn after_success(index: usize, len: usize) -> Self {
        Self::forward_to(index + 1, len)
    }

    /// The transition after the forward command of step `index` failed.
    ///
    /// The failing step is treated as never having taken effect, so
    /// compensation starts at the step before it.
    pub fn after_failure(index: usize) -> Self {
        Self::backward_from(index)
    }

    /// The transition after step `index` was compensated.
    pub fn after_compensation(index: usize) -> Self {
        Self::backward_from(index)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Transition::Completed | Transition::RolledBack)
    }
}
