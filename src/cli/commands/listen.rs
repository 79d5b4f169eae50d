//! Listen command - consume commit notifications until stopped

use crate::config::{ConfigManager, ListenerMode};
use crate::error::RefresherResult;
use crate::listener::{Backoff, PollingListener, RefreshOnMessage, Subscription};
use crate::queue;
use std::time::Duration;
use tracing::{error, info};

/// Execute the listen command
pub async fn execute(manager: &ConfigManager, verbose: u8) -> RefresherResult<()> {
    let agent = super::start(manager, verbose).await?;
    let settings = &agent.config.listener;

    let queue = match queue::from_config(&agent.config, agent.runner.clone()) {
        Ok(queue) => queue,
        Err(e) => {
            error!("Failed to create queue client: {}", e);
            return Err(e);
        }
    };
    if let Err(e) = queue.connect().await {
        error!("Failed to connect to {}: {}", queue.describe(), e);
        return Err(e);
    }
    info!("Connected to {}", queue.describe());

    let wait = Duration::from_secs(settings.wait_secs);
    match settings.effective_mode(&agent.config.queue) {
        ListenerMode::Poll => {
            let backoff = Backoff::new(
                Duration::from_secs(settings.backoff_step_secs),
                Duration::from_secs(settings.backoff_max_secs),
            );
            PollingListener::new(queue, agent.refresher.clone(), wait, backoff)
                .run_until(shutdown_signal())
                .await;
        }
        ListenerMode::Subscribe | ListenerMode::Auto => {
            let handler = RefreshOnMessage::new(agent.refresher.clone());
            Subscription::new(queue, wait, Duration::from_secs(settings.error_delay_secs))
                .run_until(&handler, shutdown_signal())
                .await;
        }
    }

    info!("Shutting down");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM where available
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Interrupt received"),
        _ = terminate => info!("Termination requested"),
    }
}
