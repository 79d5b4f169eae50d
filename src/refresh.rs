//! Refresh orchestration
//!
//! One notification means one full refresh: the working copy first, then
//! every asset category in declared order. The first failure ends the run.

use crate::config::schema::{AssetCategory, Config};
use crate::error::RefresherResult;
use crate::exec::CommandRunner;
use crate::sync::{AssetMirror, MirrorTool, Repository};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Handles "repository changed" notifications
///
/// Both listener bindings depend only on this trait.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Run one complete refresh
    async fn handle_event(&self) -> RefresherResult<()>;
}

/// Synchronizes the working copy and asset categories per notification
pub struct Refresher {
    repository: Repository,
    assets: AssetMirror,
    categories: Vec<AssetCategory>,
    running: Mutex<()>,
}

impl Refresher {
    pub fn new(
        repository: Repository,
        assets: AssetMirror,
        categories: Vec<AssetCategory>,
    ) -> Self {
        Self {
            repository,
            assets,
            categories,
            running: Mutex::new(()),
        }
    }

    /// Wire up the repository and asset mirror from configuration
    pub fn from_config(config: &Config, runner: Arc<dyn CommandRunner>) -> Self {
        let working_copy = config.repository.working_copy.clone();
        let repository = Repository::new(
            runner.clone(),
            &config.tools.git,
            &config.repository.url,
            &working_copy,
        );
        let assets = AssetMirror::new(
            runner,
            MirrorTool::from_config(&config.storage, &config.tools),
            &config.storage.root,
            working_copy,
            config.storage.exclude.clone(),
        );
        Self::new(repository, assets, config.storage.categories.clone())
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn categories(&self) -> &[AssetCategory] {
        &self.categories
    }
}

#[async_trait]
impl EventHandler for Refresher {
    async fn handle_event(&self) -> RefresherResult<()> {
        let _running = self.running.lock().await;

        self.repository.refresh().await?;

        for (done, category) in self.categories.iter().enumerate() {
            if let Err(e) = self.assets.sync(category).await {
                if done > 0 {
                    warn!(
                        "Cache possibly partially stale: {} of {} categories mirrored before failure",
                        done,
                        self.categories.len()
                    );
                }
                return Err(e);
            }
        }

        info!("Cache refresh complete");
        Ok(())
    }
}
