//! Queue consumers
//!
//! Two bindings share one contract: refresh once per notification,
//! acknowledge only after a complete refresh, never let a failed refresh
//! stop the loop.
//!
//! - [`PollingListener`]: pull model, failed notifications reappear after
//!   the queue's visibility timeout
//! - [`Subscription`]: push model, failed notifications are abandoned
//!   for immediate redelivery

mod poll;
mod subscribe;

pub use poll::{Backoff, PollOutcome, PollingListener};
pub use subscribe::{MessageHandler, RefreshOnMessage, Subscription};

use crate::error::RefresherResult;
use crate::queue::Notification;
use crate::refresh::EventHandler;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Run the refresh for one notification inside its own span
pub(crate) async fn refresh_for(
    handler: &dyn EventHandler,
    notification: &Notification,
) -> RefresherResult<()> {
    let span = info_span!(
        "event",
        event_id = %Uuid::new_v4(),
        message_id = %notification.id
    );

    async {
        match notification.delivery_count {
            Some(count) if count > 1 => {
                info!("Commit event received (delivery {}), refreshing cache", count)
            }
            _ => info!("Commit event received, refreshing cache"),
        }
        handler.handle_event().await
    }
    .instrument(span)
    .await
}
