//! Log sinks
//!
//! Two append-only files in the log directory:
//!
//! - `listener.log`: activity (everything below ERROR, down to the configured level)
//! - `listener_error.log`: ERROR entries only
//!
//! Each entry is one line prefixed with a local `[YYYY-MM-DD HH:MM:SS]`
//! timestamp. With `--verbose`, entries are mirrored to stderr as well.

use crate::error::{RefresherError, RefresherResult};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, Metadata, Subscriber};
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, Layer, Registry};

pub const ACTIVITY_LOG: &str = "listener.log";
pub const ERROR_LOG: &str = "listener_error.log";

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Local wall-clock timestamp in brackets
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTimestamp;

impl FormatTime for LogTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "[{}]", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Open handles to the activity and error logs
#[derive(Debug, Clone)]
pub struct LogFiles {
    dir: PathBuf,
    activity: Arc<File>,
    errors: Arc<File>,
}

impl LogFiles {
    /// Create `dir` if needed and open both logs for appending
    pub fn open(dir: &Path) -> RefresherResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| RefresherError::LogSetup {
            path: dir.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            activity: Arc::new(append(&dir.join(ACTIVITY_LOG))?),
            errors: Arc::new(append(&dir.join(ERROR_LOG))?),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn activity_path(&self) -> PathBuf {
        self.dir.join(ACTIVITY_LOG)
    }

    pub fn error_path(&self) -> PathBuf {
        self.dir.join(ERROR_LOG)
    }

    /// Build a subscriber that writes to both logs
    ///
    /// `level` is the most verbose level kept in the activity log; an
    /// unparseable value falls back to `info`.
    pub fn subscriber(&self, level: &str, console: bool) -> impl Subscriber + Send + Sync {
        let max = parse_level(level);

        let activity = fmt::layer()
            .with_timer(LogTimestamp)
            .with_target(false)
            .with_ansi(false)
            .with_writer(self.activity.clone())
            .with_filter(filter_fn(move |meta| keep_activity(meta, max)));

        let errors = fmt::layer()
            .with_timer(LogTimestamp)
            .with_target(false)
            .with_ansi(false)
            .with_writer(self.errors.clone())
            .with_filter(LevelFilter::ERROR);

        let console = console.then(|| {
            fmt::layer()
                .with_timer(LogTimestamp)
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter_fn(move |meta| {
                    *meta.level() == Level::ERROR || keep_activity(meta, max)
                }))
        });

        Registry::default()
            .with(activity)
            .with(errors)
            .with(console)
    }

    /// Install the subscriber for the whole process
    pub fn init(&self, level: &str, console: bool) -> RefresherResult<()> {
        tracing::subscriber::set_global_default(self.subscriber(level, console))
            .map_err(|e| RefresherError::Internal(format!("logging already initialised: {}", e)))
    }
}

fn append(path: &Path) -> RefresherResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RefresherError::LogSetup {
            path: path.to_path_buf(),
            source: e,
        })
}

fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::INFO)
}

/// Activity entries: no errors, nothing above `max`, and third-party
/// chatter only at WARN
fn keep_activity(meta: &Metadata<'_>, max: LevelFilter) -> bool {
    let level = *meta.level();
    if level == Level::ERROR || max < level {
        return false;
    }
    level == Level::WARN || meta.target().starts_with(CRATE_TARGET)
}
