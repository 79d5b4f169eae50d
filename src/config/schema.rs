//! Configuration schema for the cache refresher
//!
//! Configuration is stored at `~/.config/cache-refresher/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Longest long-poll wait SQS accepts
pub const MAX_WAIT_SECS: u64 = 20;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Notification queue
    pub queue: QueueConfig,

    /// Listener loop tuning
    pub listener: ListenerConfig,

    /// Upstream repository and local working copy
    pub repository: RepositoryConfig,

    /// Remote asset storage
    pub storage: StorageConfig,

    /// External CLI tools
    pub tools: ToolsConfig,

    /// Log destinations
    pub logging: LoggingConfig,
}

/// Queue provider settings, selected by `provider`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "kebab-case")]
pub enum QueueConfig {
    /// AWS SQS, driven through the AWS CLI
    Sqs(SqsConfig),
    /// Azure Service Bus topic subscription
    ServiceBus(ServiceBusConfig),
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::Sqs(SqsConfig::default())
    }
}

impl QueueConfig {
    /// Human-readable queue identity for log lines
    pub fn describe(&self) -> String {
        match self {
            Self::Sqs(sqs) => sqs.url.clone(),
            Self::ServiceBus(sb) => format!("topic {} / subscription {}", sb.topic, sb.subscription),
        }
    }
}

/// SQS queue settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SqsConfig {
    /// Queue URL
    pub url: String,

    /// AWS region (falls back to the CLI's configured region)
    pub region: Option<String>,

    /// AWS CLI profile
    pub profile: Option<String>,
}

/// Service Bus subscription settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceBusConfig {
    /// Namespace connection string (Endpoint=...;SharedAccessKeyName=...;SharedAccessKey=...)
    pub connection_string: String,

    /// Topic name
    pub topic: String,

    /// Subscription name
    pub subscription: String,
}

/// How notifications are consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerMode {
    /// Poll for SQS, subscribe for Service Bus
    #[default]
    Auto,
    /// Pull model with backoff on empty receives
    Poll,
    /// Push model with explicit abandon on failure
    Subscribe,
}

/// Listener loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Binding to use
    pub mode: ListenerMode,

    /// Long-poll wait per receive, in seconds
    pub wait_secs: u64,

    /// Backoff added after each empty receive, in seconds
    pub backoff_step_secs: u64,

    /// Backoff ceiling, in seconds
    pub backoff_max_secs: u64,

    /// Pause after a transport error in the subscription binding, in seconds
    pub error_delay_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            mode: ListenerMode::Auto,
            wait_secs: MAX_WAIT_SECS,
            backoff_step_secs: 5,
            backoff_max_secs: 60,
            error_delay_secs: 5,
        }
    }
}

impl ListenerConfig {
    /// Resolve `Auto` against the configured queue provider
    pub fn effective_mode(&self, queue: &QueueConfig) -> ListenerMode {
        match (self.mode, queue) {
            (ListenerMode::Auto, QueueConfig::Sqs(_)) => ListenerMode::Poll,
            (ListenerMode::Auto, QueueConfig::ServiceBus(_)) => ListenerMode::Subscribe,
            (mode, _) => mode,
        }
    }
}

/// Repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Remote repository URL
    pub url: String,

    /// Local working copy path
    pub working_copy: PathBuf,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            working_copy: PathBuf::from("/Users/Shared/Munki"),
        }
    }
}

/// Object store provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageProvider {
    /// Amazon S3 via `aws s3 sync`
    #[default]
    S3,
    /// Azure Blob Storage via `azcopy sync`
    AzureBlob,
}

/// Remote storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Object store provider
    pub provider: StorageProvider,

    /// Remote root (e.g. s3://bucket/repo or https://account.blob.core.windows.net/container/repo)
    pub root: String,

    /// SAS token appended to Azure Blob URLs
    pub sas_token: Option<String>,

    /// File name patterns never mirrored
    pub exclude: Vec<String>,

    /// Asset categories, mirrored in this order
    pub categories: Vec<AssetCategory>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::S3,
            root: String::new(),
            sas_token: None,
            exclude: vec![".DS_Store".to_string()],
            categories: ["pkgs", "icons", "catalogs"]
                .into_iter()
                .map(AssetCategory::deployment)
                .collect(),
        }
    }
}

/// A named remote-prefix to local-directory mirror unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCategory {
    /// Category name used in logs
    pub name: String,

    /// Prefix below the storage root
    pub remote: String,

    /// Directory below the working copy
    pub local: PathBuf,
}

impl AssetCategory {
    /// Category laid out under `deployment/<name>` on both sides
    pub fn deployment(name: &str) -> Self {
        Self {
            name: name.to_string(),
            remote: format!("deployment/{}", name),
            local: PathBuf::from("deployment").join(name),
        }
    }
}

/// External tool paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// git executable
    pub git: String,

    /// AWS CLI executable
    pub aws: String,

    /// AzCopy executable
    pub azcopy: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            aws: "aws".to_string(),
            azcopy: "azcopy".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory holding listener.log and listener_error.log
    pub dir: Option<PathBuf>,

    /// Most verbose level written to the activity log
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Check the configuration for values the refresher cannot run with
    ///
    /// Returns the first problem found as a human-readable reason.
    pub fn validate(&self) -> Result<(), String> {
        match &self.queue {
            QueueConfig::Sqs(sqs) => {
                if sqs.url.trim().is_empty() {
                    return Err("queue.url is required for the sqs provider".to_string());
                }
            }
            QueueConfig::ServiceBus(sb) => {
                if sb.connection_string.trim().is_empty() {
                    return Err("queue.connection_string is required for service-bus".to_string());
                }
                if sb.topic.trim().is_empty() || sb.subscription.trim().is_empty() {
                    return Err("queue.topic and queue.subscription are required".to_string());
                }
            }
        }

        if self.listener.wait_secs == 0 || self.listener.wait_secs > MAX_WAIT_SECS {
            return Err(format!(
                "listener.wait_secs must be between 1 and {}",
                MAX_WAIT_SECS
            ));
        }
        if self.listener.backoff_step_secs > self.listener.backoff_max_secs {
            return Err("listener.backoff_step_secs exceeds listener.backoff_max_secs".to_string());
        }

        if self.repository.url.trim().is_empty() {
            return Err("repository.url is required".to_string());
        }
        if self.repository.working_copy.as_os_str().is_empty() {
            return Err("repository.working_copy is required".to_string());
        }

        if self.storage.root.trim().is_empty() {
            return Err("storage.root is required".to_string());
        }
        if self.storage.categories.is_empty() {
            return Err("storage.categories must list at least one category".to_string());
        }

        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn"
        ) {
            return Err(format!(
                "logging.level must be trace, debug, info or warn (got '{}')",
                self.logging.level
            ));
        }

        let mut seen = Vec::new();
        for category in &self.storage.categories {
            if seen.contains(&category.name.as_str()) {
                return Err(format!("duplicate asset category '{}'", category.name));
            }
            seen.push(category.name.as_str());

            if !is_contained(&category.local) {
                return Err(format!(
                    "asset category '{}' must use a relative local path below the working copy, without '..' or .git",
                    category.name
                ));
            }
        }

        let locals: Vec<(&str, PathBuf)> = self
            .storage
            .categories
            .iter()
            .map(|c| (c.name.as_str(), normalized(&c.local)))
            .collect();
        for (i, (name, local)) in locals.iter().enumerate() {
            for (other, other_local) in &locals[i + 1..] {
                if local.starts_with(other_local) || other_local.starts_with(local) {
                    return Err(format!(
                        "asset categories '{}' and '{}' have overlapping local paths",
                        name, other
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Relative, strictly below the root, free of parent components and
/// outside `.git`
fn is_contained(path: &Path) -> bool {
    let only_relative = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    let first = path.components().find_map(|c| match c {
        Component::Normal(name) => Some(name),
        _ => None,
    });
    only_relative && first.is_some_and(|name| name != ".git")
}

/// Path with `.` components dropped
fn normalized(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}
