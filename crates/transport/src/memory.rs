use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use common::ChannelName;
use futures_util::FutureExt;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::{MessageHandler, Result, Subscription, Transport, TransportError};

/// Number of recent messages kept per channel for [`InMemoryTransport::published`].
pub const DEFAULT_LOG_CAPACITY: usize = 128;

struct ChannelState {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    /// `None` while a delivery loop owns the receiving half.
    receiver: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    /// The most recent published messages, at most `log_capacity` of them.
    published: VecDeque<Vec<u8>>,
}

impl ChannelState {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
            published: VecDeque::new(),
        }
    }

    fn record(&mut self, message: &[u8], capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.published.len() >= capacity {
            self.published.pop_front();
        }
        self.published.push_back(message.to_vec());
    }
}

#[derive(Default)]
struct Faults {
    ensure_channel: HashSet<ChannelName>,
    subscribe: HashSet<ChannelName>,
    publish: HashSet<ChannelName>,
}

/// In-memory transport implementation.
///
/// Behaves like a small broker: channels must be created before anything is
/// published to them, each channel has at most one consumer, and messages
/// published before a consumer subscribes are buffered until it does.
/// Each subscription runs its own delivery task, so handlers of different
/// channels run concurrently while messages of one channel are handled in
/// publish order.
///
/// The last [`DEFAULT_LOG_CAPACITY`] messages of every channel are kept for
/// inspection; use [`with_log_capacity`](Self::with_log_capacity) to change
/// or disable that.
#[derive(Clone)]
pub struct InMemoryTransport {
    channels: Arc<RwLock<HashMap<ChannelName, ChannelState>>>,
    faults: Arc<RwLock<Faults>>,
    log_capacity: usize,
}

impl InMemoryTransport {
    /// Creates a new transport with no channels.
    pub fn new() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Creates a transport keeping at most `capacity` published messages per
    /// channel. Zero disables the log.
    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::default(),
            faults: Arc::default(),
            log_capacity: capacity,
        }
    }

    /// Returns the number of channels created so far.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Returns true if the channel exists.
    pub async fn has_channel(&self, channel: &str) -> bool {
        self.channels.read().await.contains_key(channel)
    }

    /// Returns the most recent messages published to `channel`, oldest first.
    pub async fn published(&self, channel: &str) -> Vec<Vec<u8>> {
        self.channels
            .read()
            .await
            .get(channel)
            .map(|state| state.published.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes every future `ensure_channel` call for `channel` fail.
    pub async fn fail_ensure_channel(&self, channel: impl Into<ChannelName>) {
        self.faults.write().await.ensure_channel.insert(channel.into());
    }

    /// Makes every future `subscribe` call for `channel` fail.
    pub async fn fail_subscribe(&self, channel: impl Into<ChannelName>) {
        self.faults.write().await.subscribe.insert(channel.into());
    }

    /// Makes every future `publish` call for `channel` fail.
    pub async fn fail_publish(&self, channel: impl Into<ChannelName>) {
        self.faults.write().await.publish.insert(channel.into());
    }

    /// Removes all injected failures.
    pub async fn clear_faults(&self) {
        let mut faults = self.faults.write().await;
        faults.ensure_channel.clear();
        faults.subscribe.clear();
        faults.publish.clear();
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn ensure_channel(&self, channel: &ChannelName) -> Result<()> {
        if self.faults.read().await.ensure_channel.contains(channel) {
            return Err(TransportError::ChannelCreation {
                channel: channel.clone(),
                reason: "injected failure".to_string(),
            });
        }

        let mut channels = self.channels.write().await;
        if !channels.contains_key(channel) {
            channels.insert(channel.clone(), ChannelState::new());
            tracing::debug!(%channel, "channel created");
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &ChannelName,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        if self.faults.read().await.subscribe.contains(channel) {
            return Err(TransportError::Subscription {
                channel: channel.clone(),
                reason: "injected failure".to_string(),
            });
        }

        let mut receiver = {
            let mut channels = self.channels.write().await;
            let state = channels
                .get_mut(channel)
                .ok_or_else(|| TransportError::ChannelNotFound(channel.clone()))?;
            state
                .receiver
                .take()
                .ok_or_else(|| TransportError::AlreadySubscribed(channel.clone()))?
        };

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let channels = Arc::clone(&self.channels);
        let name = channel.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    message = receiver.recv() => match message {
                        Some(message) => {
                            metrics::counter!("transport_messages_delivered_total").increment(1);
                            let handled = AssertUnwindSafe(handler.handle(&name, &message))
                                .catch_unwind()
                                .await;
                            if handled.is_err() {
                                metrics::counter!("transport_handler_panics_total").increment(1);
                                tracing::error!(
                                    channel = %name,
                                    "message handler panicked, message dropped"
                                );
                            }
                        }
                        None => break,
                    },
                }
            }

            // Hand the queue back so the channel can be subscribed again.
            if let Some(state) = channels.write().await.get_mut(&name) {
                state.receiver = Some(receiver);
            }
            tracing::debug!(channel = %name, "delivery loop stopped");
        });

        tracing::debug!(%channel, "subscribed");
        Ok(Subscription::new(channel.clone(), stop_tx, task))
    }

    async fn publish(&self, channel: &ChannelName, message: Vec<u8>) -> Result<()> {
        if self.faults.read().await.publish.contains(channel) {
            return Err(TransportError::Publish {
                channel: channel.clone(),
                reason: "injected failure".to_string(),
            });
        }

        let mut channels = self.channels.write().await;
        let state = channels
            .get_mut(channel)
            .ok_or_else(|| TransportError::ChannelNotFound(channel.clone()))?;

        state.record(&message, self.log_capacity);
        state
            .sender
            .send(message)
            .map_err(|_| TransportError::Closed(channel.clone()))?;

        metrics::counter!("transport_messages_published_total").increment(1);
        Ok(())
    }
}
