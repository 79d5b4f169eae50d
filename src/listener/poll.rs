//! Polling binding
//!
//! Long-polls for one notification at a time. Empty receives back off by a
//! fixed step up to a ceiling; any notification resets the backoff. Failed
//! refreshes are not acknowledged, so the queue redelivers them once the
//! visibility timeout expires.

use super::refresh_for;
use crate::error::RefresherResult;
use crate::queue::{Notification, QueueService};
use crate::refresh::EventHandler;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Delay accumulator for consecutive empty receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    step: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(step: Duration, ceiling: Duration) -> Self {
        Self {
            step,
            ceiling,
            current: Duration::ZERO,
        }
    }

    /// Record an empty receive and return the delay before the next one
    pub fn on_empty(&mut self) -> Duration {
        self.current = (self.current + self.step).min(self.ceiling);
        self.current
    }

    /// Record a non-empty receive
    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

/// Result of one receive/process cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing arrived; sleep this long before polling again
    Idle(Duration),
    /// The queue could not be reached; sleep this long before retrying
    Unreachable(Duration),
    /// A notification was refreshed and acknowledged
    Refreshed,
    /// The refresh failed; the notification stays on the queue
    Failed,
}

impl PollOutcome {
    /// Pause owed before the next receive
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Idle(d) | Self::Unreachable(d) if !d.is_zero() => Some(*d),
            _ => None,
        }
    }
}

/// Pull-model queue consumer
pub struct PollingListener {
    queue: Arc<dyn QueueService>,
    handler: Arc<dyn EventHandler>,
    wait: Duration,
    backoff: Backoff,
}

impl PollingListener {
    pub fn new(
        queue: Arc<dyn QueueService>,
        handler: Arc<dyn EventHandler>,
        wait: Duration,
        backoff: Backoff,
    ) -> Self {
        Self {
            queue,
            handler,
            wait,
            backoff,
        }
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Receive at most one notification and process it
    pub async fn poll_once(&mut self) -> PollOutcome {
        let received = self.queue.receive(1, self.wait).await;
        self.process(received).await
    }

    async fn process(&mut self, received: RefresherResult<Vec<Notification>>) -> PollOutcome {
        let notification = match received {
            Ok(batch) => match batch.into_iter().next() {
                Some(notification) => notification,
                None => return PollOutcome::Idle(self.backoff.on_empty()),
            },
            Err(e) => {
                error!("Queue receive failed: {}", e);
                return PollOutcome::Unreachable(self.backoff.on_empty());
            }
        };
        self.backoff.reset();

        if let Err(e) = refresh_for(self.handler.as_ref(), &notification).await {
            error!("Processing error: {}", e);
            return PollOutcome::Failed;
        }

        if let Err(e) = self.queue.acknowledge(&notification).await {
            // The refresh already converged; a redelivery only repeats it.
            error!("Failed to delete message {}: {}", notification.id, e);
        } else {
            info!("Cache refresh acknowledged");
        }
        PollOutcome::Refreshed
    }

    /// Poll until `shutdown` resolves
    ///
    /// Shutdown is honoured while waiting on the queue or sleeping off the
    /// backoff, never in the middle of a refresh.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Polling {}", self.queue.describe());

        loop {
            let received = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                received = self.queue.receive(1, self.wait) => received,
            };

            let outcome = self.process(received).await;

            if let Some(delay) = outcome.delay() {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        info!("Polling stopped");
    }
}
