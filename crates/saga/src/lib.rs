//! Message-driven saga orchestration.
//!
//! A saga is an ordered sequence of steps, each bound to a message channel
//! and carrying a forward command and a compensating command. The
//! [`SagaProcessor`] subscribes to every step channel and drives each saga
//! instance from envelope to envelope:
//!
//! 1. A forward envelope for step `i` runs the step's forward command.
//! 2. On success the envelope for step `i + 1` is published, or the saga
//!    completes after the last step.
//! 3. On failure the steps before `i` are compensated in reverse order by
//!    publishing backward envelopes, until the saga is rolled back.
//!
//! All progress travels inside the [`SagaEnvelope`]; the processor keeps no
//! per-instance state between transitions.

pub mod builder;
pub mod command;
pub mod config;
pub mod definition;
pub mod envelope;
pub mod error;
pub mod events;
pub mod processor;
pub mod state;

pub use builder::{SagaDefinitionBuilder, StepBuilder};
pub use command::{FnCommand, StepCommand, command_fn};
pub use config::{CompensationPolicy, OnExhausted, ProcessorConfig, UnknownPolicy};
pub use definition::{SagaDefinition, SagaStep};
pub use envelope::{Payload, SagaEnvelope};
pub use error::{CommandError, EnvelopeError, Result, SagaError};
pub use events::SagaEvent;
pub use processor::SagaProcessor;
pub use state::{Phase, SagaProgress, Transition};
