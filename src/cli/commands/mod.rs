//! CLI command implementations

pub mod config;
pub mod listen;
pub mod refresh;
pub mod status;

pub use config::execute as config;
pub use listen::execute as listen;
pub use refresh::execute as refresh;
pub use status::execute as status;

use crate::config::{Config, ConfigManager};
use crate::error::RefresherResult;
use crate::exec::{CommandRunner, ProcessRunner};
use crate::lock::WorkingCopyLock;
use crate::logging::LogFiles;
use crate::refresh::Refresher;
use std::sync::Arc;
use tracing::{error, info};

/// Everything a command needs once it owns the working copy
pub(crate) struct Agent {
    pub config: Config,
    pub runner: Arc<dyn CommandRunner>,
    pub refresher: Arc<Refresher>,
    _lock: WorkingCopyLock,
}

/// Shared startup for `listen` and `refresh`
///
/// Loads and validates the config, opens the log files, takes the
/// working-copy lock and makes sure the working copy exists.
pub(crate) async fn start(manager: &ConfigManager, verbose: u8) -> RefresherResult<Agent> {
    let config = manager.load_validated().await?;

    let logs = LogFiles::open(&ConfigManager::log_dir(&config))?;
    let level = if verbose >= 2 {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    logs.init(level, verbose > 0)?;

    info!(
        "cache-refresher {} starting (config {})",
        env!("CARGO_PKG_VERSION"),
        manager.path().display()
    );

    match prepare(config).await {
        Ok(agent) => Ok(agent),
        Err(e) => {
            error!("Startup failed: {}", e);
            Err(e)
        }
    }
}

async fn prepare(config: Config) -> RefresherResult<Agent> {
    let lock = WorkingCopyLock::acquire(&config.repository.working_copy).await?;

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let refresher = Arc::new(Refresher::from_config(&config, runner.clone()));
    refresher.repository().ensure().await?;

    Ok(Agent {
        config,
        runner,
        refresher,
        _lock: lock,
    })
}
