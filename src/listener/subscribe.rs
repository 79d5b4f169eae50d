//! Push binding
//!
//! A [`Subscription`] pumps deliveries from the queue into a
//! [`MessageHandler`], one at a time. The handler settles each delivery
//! itself; transport failures go to the handler's error callback and the
//! subscription keeps running.

use super::refresh_for;
use crate::error::RefresherError;
use crate::queue::{Notification, QueueService};
use crate::refresh::EventHandler;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Callbacks invoked by a [`Subscription`]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process and settle one delivery
    async fn process_message(&self, queue: &dyn QueueService, notification: Notification);

    /// Observe a transport failure; must not stop the subscription
    async fn process_error(&self, queue: &dyn QueueService, error: RefresherError);
}

/// Refreshes the cache per delivery; completes on success, abandons on failure
pub struct RefreshOnMessage {
    handler: Arc<dyn EventHandler>,
}

impl RefreshOnMessage {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl MessageHandler for RefreshOnMessage {
    async fn process_message(&self, queue: &dyn QueueService, notification: Notification) {
        match refresh_for(self.handler.as_ref(), &notification).await {
            Ok(()) => match queue.acknowledge(&notification).await {
                Ok(()) => info!("Cache refresh acknowledged"),
                Err(e) => error!("Failed to complete message {}: {}", notification.id, e),
            },
            Err(e) => {
                error!("Process error: {}", e);
                if let Err(abandon) = queue.abandon(&notification).await {
                    // The lock expires on its own; redelivery is only delayed.
                    error!("Failed to abandon message {}: {}", notification.id, abandon);
                }
            }
        }
    }

    async fn process_error(&self, queue: &dyn QueueService, error: RefresherError) {
        error!("{} error: {}", queue.service_name(), error);
    }
}

/// Push-model queue consumer with single concurrency
pub struct Subscription {
    queue: Arc<dyn QueueService>,
    wait: Duration,
    error_delay: Duration,
}

impl Subscription {
    pub fn new(queue: Arc<dyn QueueService>, wait: Duration, error_delay: Duration) -> Self {
        Self {
            queue,
            wait,
            error_delay,
        }
    }

    /// Receive once and hand the result to `handler`
    ///
    /// Returns false when a transport error was reported.
    pub async fn dispatch_once(&self, handler: &dyn MessageHandler) -> bool {
        match self.queue.receive(1, self.wait).await {
            Ok(batch) => {
                self.deliver(handler, batch).await;
                true
            }
            Err(e) => {
                handler.process_error(self.queue.as_ref(), e).await;
                false
            }
        }
    }

    async fn deliver(&self, handler: &dyn MessageHandler, batch: Vec<Notification>) {
        for notification in batch {
            handler
                .process_message(self.queue.as_ref(), notification)
                .await;
        }
    }

    /// Pump deliveries into `handler` until `shutdown` resolves
    ///
    /// A delivery already handed to the handler is always processed and
    /// settled before shutdown is observed.
    pub async fn run_until<F>(self, handler: &dyn MessageHandler, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Listening on {}", self.queue.describe());

        loop {
            let received = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                received = self.queue.receive(1, self.wait) => received,
            };

            match received {
                Ok(batch) => self.deliver(handler, batch).await,
                Err(e) => {
                    handler.process_error(self.queue.as_ref(), e).await;
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(self.error_delay) => {}
                    }
                }
            }
        }

        info!("Subscription closed");
    }
}
