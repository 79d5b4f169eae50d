//! Refresh command - run one refresh without a queue

use crate::config::ConfigManager;
use crate::error::RefresherResult;
use crate::refresh::EventHandler;
use console::style;
use tracing::{error, info};

/// Execute the refresh command
pub async fn execute(manager: &ConfigManager, verbose: u8) -> RefresherResult<()> {
    let agent = super::start(manager, verbose).await?;

    info!("Manual refresh requested");
    if let Err(e) = agent.refresher.handle_event().await {
        error!("Processing error: {}", e);
        return Err(e);
    }

    println!(
        "{} Cache refreshed at {}",
        style("[OK]").green(),
        agent.config.repository.working_copy.display()
    );
    Ok(())
}
