//! Notification queue contract
//!
//! The refresher treats every delivery as an opaque "something changed"
//! signal. Bodies are never parsed; only the handle needed to settle the
//! delivery is kept.

#[cfg(test)]
pub(crate) mod fake;
pub mod service_bus;
pub mod sqs;

pub use service_bus::ServiceBusQueue;
pub use sqs::SqsQueue;

use crate::config::schema::{Config, QueueConfig};
use crate::error::RefresherResult;
use crate::exec::CommandRunner;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One delivery from the queue service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Service-assigned message id, for logs only
    pub id: String,
    /// Receipt handle or lock URL used to acknowledge or abandon
    pub handle: String,
    /// How many times the service has delivered this message, when known
    pub delivery_count: Option<u32>,
}

/// At-least-once queue with explicit settlement
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Short name used in log lines and errors
    fn service_name(&self) -> &'static str;

    /// Human-readable queue identity
    fn describe(&self) -> String;

    /// Verify the queue is reachable with the configured credentials
    async fn connect(&self) -> RefresherResult<()>;

    /// Wait up to `wait` for at most `max` notifications
    async fn receive(&self, max: u32, wait: Duration) -> RefresherResult<Vec<Notification>>;

    /// Remove a processed notification so it is never redelivered
    async fn acknowledge(&self, notification: &Notification) -> RefresherResult<()>;

    /// Release a notification for immediate redelivery
    async fn abandon(&self, notification: &Notification) -> RefresherResult<()>;
}

/// Build the queue client selected in the configuration
pub fn from_config(
    config: &Config,
    runner: Arc<dyn CommandRunner>,
) -> RefresherResult<Arc<dyn QueueService>> {
    let queue: Arc<dyn QueueService> = match &config.queue {
        QueueConfig::Sqs(sqs) => Arc::new(SqsQueue::new(runner, &config.tools.aws, sqs)),
        QueueConfig::ServiceBus(sb) => Arc::new(ServiceBusQueue::from_config(sb)?),
    };
    Ok(queue)
}
