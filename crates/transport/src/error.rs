use common::ChannelName;
use thiserror::Error;

/// Errors that can occur when talking to the message transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The channel has not been created.
    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelName),

    /// The channel already has an active subscriber.
    #[error("Channel {0} already has an active subscriber")]
    AlreadySubscribed(ChannelName),

    /// The broker refused to create the channel.
    #[error("Failed to create channel {channel}: {reason}")]
    ChannelCreation { channel: ChannelName, reason: String },

    /// The broker refused the subscription.
    #[error("Failed to subscribe to channel {channel}: {reason}")]
    Subscription { channel: ChannelName, reason: String },

    /// The message could not be published.
    #[error("Failed to publish to channel {channel}: {reason}")]
    Publish { channel: ChannelName, reason: String },

    /// The channel's delivery side has gone away.
    #[error("Channel {0} is closed")]
    Closed(ChannelName),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
