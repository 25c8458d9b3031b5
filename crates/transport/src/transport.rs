use std::sync::Arc;

use async_trait::async_trait;
use common::ChannelName;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::Result;

/// Receives the messages delivered on a subscribed channel.
///
/// Handlers have no way to report failure back to the transport: a message
/// that cannot be processed must be dealt with (logged, dropped) by the
/// handler itself so the delivery loop keeps running.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one raw message delivered on `channel`.
    async fn handle(&self, channel: &ChannelName, message: &[u8]);
}

/// Core trait for message transports.
///
/// Implementations must be safe for concurrent publish and concurrent
/// delivery (Send + Sync). No ordering, deduplication or exactly-once
/// semantics are required by this contract.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Creates the channel if it does not exist yet.
    ///
    /// Calling this for an existing channel is a no-op.
    async fn ensure_channel(&self, channel: &ChannelName) -> Result<()>;

    /// Starts delivering the messages of `channel` to `handler`.
    ///
    /// Delivery stops when the returned [`Subscription`] is cancelled or
    /// dropped.
    async fn subscribe(
        &self,
        channel: &ChannelName,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription>;

    /// Publishes a serialized message to `channel`.
    async fn publish(&self, channel: &ChannelName, message: Vec<u8>) -> Result<()>;
}

/// Handle to an active channel subscription.
///
/// Dropping the handle asks the delivery loop to stop after the message it
/// is currently handling. Use [`Subscription::cancel`] to also wait for it.
#[derive(Debug)]
pub struct Subscription {
    channel: ChannelName,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wraps the stop signal and the task of a delivery loop.
    pub fn new(channel: ChannelName, stop: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            channel,
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Returns the subscribed channel.
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Stops delivery and waits until the delivery loop has exited.
    pub async fn cancel(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(channel = %self.channel, error = %e, "delivery loop ended abnormally");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_waits_for_the_loop_to_exit() {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
            let _ = done_tx.send(());
        });

        let subscription = Subscription::new(ChannelName::new("orders"), stop_tx, task);
        assert_eq!(subscription.channel().as_str(), "orders");
        subscription.cancel().await;

        assert!(done_rx.await.is_ok());
    }

    #[tokio::test]
    async fn drop_signals_the_loop() {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let stopped = stop_rx.await.is_ok();
            let _ = done_tx.send(stopped);
        });
        drop(Subscription::new(ChannelName::new("orders"), stop_tx, task));

        let stopped = tokio::time::timeout(std::time::Duration::from_secs(1), done_rx)
            .await
            .unwrap()
            .unwrap();
        assert!(stopped);
    }
}
