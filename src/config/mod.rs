//! Configuration management for the cache refresher

pub mod schema;

pub use schema::{
    AssetCategory, Config, ListenerMode, QueueConfig, ServiceBusConfig, SqsConfig,
    StorageProvider,
};

use crate::error::{RefresherError, RefresherResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cache-refresher")
            .join("config.toml")
    }

    /// Get the default log directory
    ///
    /// `~/Library/Logs/CacheRefresher` on macOS, the XDG state dir elsewhere.
    pub fn default_log_dir() -> PathBuf {
        if cfg!(target_os = "macos") {
            if let Some(home) = dirs::home_dir() {
                return home.join("Library").join("Logs").join("CacheRefresher");
            }
        }
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cache-refresher")
            .join("logs")
    }

    /// Resolve the log directory for a loaded config
    pub fn log_dir(config: &Config) -> PathBuf {
        config
            .logging
            .dir
            .clone()
            .unwrap_or_else(Self::default_log_dir)
    }

    /// Load configuration, falling back to defaults if the file is missing
    pub async fn load(&self) -> RefresherResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration and reject it unless it is complete
    ///
    /// Used by every command that talks to the queue or touches the working copy.
    pub async fn load_validated(&self) -> RefresherResult<Config> {
        if !self.config_path.exists() {
            return Err(RefresherError::ConfigNotFound(self.config_path.clone()));
        }

        let config = self.load_from_file(&self.config_path).await?;
        config
            .validate()
            .map_err(|reason| RefresherError::ConfigInvalid {
                path: self.config_path.clone(),
                reason,
            })?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> RefresherResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            RefresherError::io(format!("reading config from {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| RefresherError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> RefresherResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            RefresherError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> RefresherResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RefresherError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
