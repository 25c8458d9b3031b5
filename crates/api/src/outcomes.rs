//! Running totals of saga outcomes, fed from the processor's event stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use saga::SagaEvent;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Counts of finished saga instances by terminal state.
#[derive(Debug, Default)]
pub struct SagaOutcomes {
    completed: AtomicU64,
    rolled_back: AtomicU64,
    halted: AtomicU64,
    stalled: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutcomeSnapshot {
    pub completed: u64,
    pub rolled_back: u64,
    pub halted: u64,
    pub stalled: u64,
}

impl SagaOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts `event` if it ends a saga instance.
    pub fn record(&self, event: &SagaEvent) {
        let counter = match event {
            SagaEvent::SagaCompleted(_) => &self.completed,
            SagaEvent::SagaRolledBack(_) => &self.rolled_back,
            SagaEvent::RollbackHalted(_) => &self.halted,
            SagaEvent::TransitionFailed(_) => &self.stalled,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OutcomeSnapshot {
        OutcomeSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            halted: self.halted.load(Ordering::Relaxed),
            stalled: self.stalled.load(Ordering::Relaxed),
        }
    }
}

/// Spawns a task recording every event from `events` into `outcomes`.
///
/// The task ends once the processor is dropped.
pub fn track(outcomes: Arc<SagaOutcomes>, mut events: broadcast::Receiver<SagaEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => outcomes.record(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "outcome tracker lagged behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
