//! Error types for the cache refresher
//!
//! All modules use `RefresherResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for refresher operations
pub type RefresherResult<T> = Result<T, RefresherError>;

/// All errors that can occur while refreshing the cache
#[derive(Error, Debug)]
pub enum RefresherError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Startup errors
    #[error("Another refresher already holds the lock on {0}")]
    AlreadyRunning(PathBuf),

    #[error("Working copy unusable at {path}: {reason}")]
    WorkingCopyUnusable { path: PathBuf, reason: String },

    #[error("Failed to open log file {path}: {source}")]
    LogSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Command execution error: {command}, exit code: {}, stderr: {stderr}{}",
        display_code(*.code),
        stdout_suffix(.stdout)
    )]
    CommandExecution {
        command: String,
        code: Option<i32>,
        stderr: String,
        stdout: String,
    },

    #[error("Command output exceeded {limit} bytes: {command}")]
    OutputLimit { command: String, limit: usize },

    // Sync errors
    #[error("Repository {step} failed: {source}")]
    RepositorySync {
        step: &'static str,
        #[source]
        source: Box<RefresherError>,
    },

    #[error("Failed to mirror asset category '{category}': {source}")]
    AssetSync {
        category: String,
        #[source]
        source: Box<RefresherError>,
    },

    // Queue errors
    #[error("{service} transport error: {reason}")]
    Transport { service: &'static str, reason: String },

    #[error("{service} rejected our credentials: {reason}")]
    Unauthorized { service: &'static str, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn stdout_suffix(stdout: &str) -> String {
    if stdout.is_empty() {
        String::new()
    } else {
        format!(", stdout: {}", stdout)
    }
}

fn display_code(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl RefresherError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(
        command: impl Into<String>,
        code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandExecution {
            command: command.into(),
            code,
            stderr: stderr.into(),
            stdout: String::new(),
        }
    }

    /// Attach captured stdout to a command execution error
    ///
    /// Some tools (azcopy) report their failure reason on stdout only.
    pub fn with_stdout(self, output: impl Into<String>) -> Self {
        match self {
            Self::CommandExecution {
                command,
                code,
                stderr,
                ..
            } => Self::CommandExecution {
                command,
                code,
                stderr,
                stdout: output.into(),
            },
            other => other,
        }
    }

    /// Create a transport error for a queue service
    pub fn transport(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Transport {
            service,
            reason: reason.into(),
        }
    }

    /// Wrap an error raised by one repository step
    pub fn repository(step: &'static str, source: RefresherError) -> Self {
        Self::RepositorySync {
            step,
            source: Box::new(source),
        }
    }

    /// Wrap an error raised while mirroring one asset category
    pub fn asset(category: impl Into<String>, source: RefresherError) -> Self {
        Self::AssetSync {
            category: category.into(),
            source: Box::new(source),
        }
    }

    /// Check if error is retryable
    ///
    /// Retryable errors leave the notification unacknowledged so the queue
    /// redelivers it. Everything else is fatal at startup.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. }
                | Self::CommandExecution { .. }
                | Self::OutputLimit { .. }
                | Self::RepositorySync { .. }
                | Self::AssetSync { .. }
                | Self::Transport { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } | Self::ConfigNotFound(_) => {
                Some("Run: cache-refresher config init, then edit the generated file")
            }
            Self::AlreadyRunning(_) => {
                Some("Only one refresher may manage a working copy; stop the other instance")
            }
            Self::Unauthorized { .. } => Some("Check the queue credentials in the config file"),
            Self::WorkingCopyUnusable { .. } => {
                Some("Remove or repair the working copy; it will be cloned again on startup")
            }
            _ => None,
        }
    }
}
