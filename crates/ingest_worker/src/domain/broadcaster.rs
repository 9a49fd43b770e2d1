use common::{BroadcastSink, Notification};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Non-blocking handle used by ingestion and the sweeper to emit notifications.
///
/// Notifications go through a bounded queue drained by a [`BroadcastWorker`].
/// When the queue is full the notification is dropped, so a slow or failing
/// sink never holds up the caller.
#[derive(Clone)]
pub struct Broadcaster {
    sender: Option<mpsc::Sender<Notification>>,
}

impl Broadcaster {
    pub fn channel(sink: Arc<dyn BroadcastSink>, buffer_size: usize) -> (Self, BroadcastWorker) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        (
            Self {
                sender: Some(sender),
            },
            BroadcastWorker { receiver, sink },
        )
    }

    /// A broadcaster that discards everything
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn publish(&self, notification: Notification) {
        let Some(sender) = &self.sender else {
            return;
        };

        match sender.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(
                    channel_key = %dropped.channel_key,
                    "broadcast queue full, dropping notification"
                );
            }
            Err(TrySendError::Closed(dropped)) => {
                debug!(
                    channel_key = %dropped.channel_key,
                    "broadcast worker stopped, dropping notification"
                );
            }
        }
    }
}

/// Drains queued notifications into the sink, logging and swallowing failures
pub struct BroadcastWorker {
    receiver: mpsc::Receiver<Notification>,
    sink: Arc<dyn BroadcastSink>,
}

impl BroadcastWorker {
    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!("broadcast worker started");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    self.flush_pending().await;
                    break;
                }
                next = self.receiver.recv() => {
                    match next {
                        Some(notification) => self.deliver(notification).await,
                        None => break,
                    }
                }
            }
        }

        info!("broadcast worker stopped");
        Ok(())
    }

    async fn deliver(&self, notification: Notification) {
        let channel_key = notification.channel_key.clone();
        if let Err(e) = self
            .sink
            .send(notification.channel_key, notification.payload)
            .await
        {
            error!(channel_key = %channel_key, error = %e, "failed to broadcast notification");
        }
    }

    // best effort: deliver what is already queued, accept nothing new
    async fn flush_pending(&mut self) {
        self.receiver.close();
        while let Ok(notification) = self.receiver.try_recv() {
            self.deliver(notification).await;
        }
    }
}
