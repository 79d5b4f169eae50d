//! External command execution
//!
//! Every git, AWS CLI and AzCopy invocation goes through [`CommandRunner`], so
//! the sync components never touch `tokio::process` directly and tests can
//! substitute a scripted runner.

#[cfg(test)]
pub(crate) mod fake;

use crate::error::{RefresherError, RefresherResult};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info};

/// Default cap on captured bytes per output stream (5 MiB)
pub const DEFAULT_OUTPUT_LIMIT: usize = 5 * 1024 * 1024;

/// A command line to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    redact: Vec<String>,
    quiet: bool,
}

impl CommandSpec {
    /// Start a command for `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            redact: Vec::new(),
            quiet: false,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run inside `dir`
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Mask `secret` wherever it appears when the command is displayed
    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.redact.push(secret);
        }
        self
    }

    /// Keep successful output out of the activity log (debug level only)
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    fn masked(&self, value: &str) -> String {
        self.redact
            .iter()
            .fold(value.to_string(), |acc, secret| acc.replace(secret.as_str(), "***"))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked(&self.program))?;
        for arg in &self.args {
            let arg = self.masked(arg);
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes external commands to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command, returning its output only on a zero exit status
    async fn run(&self, spec: &CommandSpec) -> RefresherResult<CommandOutput>;
}

/// Runs commands as child processes with bounded output capture
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    output_limit: usize,
}

impl ProcessRunner {
    /// Create a runner with the default 5 MiB capture limit
    pub fn new() -> Self {
        Self {
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    /// Create a runner with a custom capture limit
    pub fn with_output_limit(output_limit: usize) -> Self {
        Self { output_limit }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

enum Capture {
    Overflow,
    Io(std::io::Error),
}

/// Read a stream to EOF, giving up once more than `limit` bytes arrive
async fn read_capped<R: AsyncRead + Unpin>(reader: R, limit: usize) -> Result<Vec<u8>, Capture> {
    let mut buf = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await
        .map_err(Capture::Io)?;

    if buf.len() > limit {
        return Err(Capture::Overflow);
    }
    Ok(buf)
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> RefresherResult<CommandOutput> {
        let line = spec.to_string();
        debug!("Executing: {}", line);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| RefresherError::command_failed(&line, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RefresherError::Internal("child stdout not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RefresherError::Internal("child stderr not piped".to_string()))?;

        let captured = tokio::try_join!(
            read_capped(stdout, self.output_limit),
            read_capped(stderr, self.output_limit)
        );

        let (stdout, stderr) = match captured {
            Ok(pair) => pair,
            Err(Capture::Overflow) => {
                let _ = child.kill().await;
                return Err(RefresherError::OutputLimit {
                    command: line,
                    limit: self.output_limit,
                });
            }
            Err(Capture::Io(e)) => {
                let _ = child.kill().await;
                return Err(RefresherError::io(format!("reading output of {}", line), e));
            }
        };

        let status = child
            .wait()
            .await
            .map_err(|e| RefresherError::command_failed(&line, e))?;

        let stdout = String::from_utf8_lossy(&stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();

        if !status.success() {
            return Err(
                RefresherError::command_exec(line, status.code(), stderr).with_stdout(stdout),
            );
        }

        for text in [&stdout, &stderr] {
            if text.is_empty() {
                continue;
            }
            if spec.quiet {
                debug!("{}", text);
            } else {
                info!("{}", text);
            }
        }

        Ok(CommandOutput { stdout, stderr })
    }
}
