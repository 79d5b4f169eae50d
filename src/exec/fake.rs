//! Scripted command runner for unit tests

use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::{RefresherError, RefresherResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records every command and fails the ones whose line contains a marker
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    issued: Mutex<Vec<CommandSpec>>,
    failures: Mutex<Vec<(String, String)>>,
    replies: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hold every command open for `delay`, to observe overlap
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Fail any command whose display line contains `marker`
    pub(crate) fn fail_when(&self, marker: &str, stderr: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((marker.to_string(), stderr.to_string()));
    }

    /// Answer any command whose display line contains `marker` with `stdout`
    pub(crate) fn reply_when(&self, marker: &str, stdout: &str) {
        self.replies
            .lock()
            .unwrap()
            .push((marker.to_string(), stdout.to_string()));
    }

    /// Display lines of every command issued so far
    pub(crate) fn lines(&self) -> Vec<String> {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub(crate) fn specs(&self) -> Vec<CommandSpec> {
        self.issued.lock().unwrap().clone()
    }

    /// Highest number of commands observed running at once
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> RefresherResult<CommandOutput> {
        let line = spec.to_string();
        self.issued.lock().unwrap().push(spec.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(marker, _)| line.contains(marker.as_str()))
            .map(|(_, stderr)| stderr.clone());
        if let Some(stderr) = failure {
            return Err(RefresherError::command_exec(line, Some(1), stderr));
        }

        let stdout = self
            .replies
            .lock()
            .unwrap()
            .iter()
            .find(|(marker, _)| line.contains(marker.as_str()))
            .map(|(_, stdout)| stdout.clone())
            .unwrap_or_default();

        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}
