//! Message channel transport used by the saga processor.
//!
//! The processor needs exactly three things from a broker: make sure a
//! channel exists, register a handler for the messages delivered on a
//! channel, and publish a serialized message to a channel. [`Transport`]
//! captures that contract; [`InMemoryTransport`] implements it on top of
//! tokio queues for tests and single-process deployments.

pub mod error;
pub mod memory;
pub mod transport;

pub use common::ChannelName;
pub use error::{Result, TransportError};
pub use memory::{DEFAULT_LOG_CAPACITY, InMemoryTransport};
pub use transport::{MessageHandler, Subscription, Transport};
