//! Status command - configuration summary, tool availability, working copy state

use crate::config::{Config, ConfigManager, QueueConfig, StorageProvider};
use crate::error::{RefresherError, RefresherResult};
use crate::exec::{CommandRunner, CommandSpec, ProcessRunner};
use crate::lock::WorkingCopyLock;
use crate::ui::{self, Mark, UiContext};
use std::path::Path;

/// Execute the status command
pub async fn execute(manager: &ConfigManager) -> RefresherResult<()> {
    let ctx = UiContext::detect();
    let runner = ProcessRunner::new();
    let config = manager.load().await?;
    let mut all_ok = true;

    ui::intro(&ctx, "Cache Refresher Status");

    ui::section(&ctx, "Configuration");
    ui::key_value(&ctx, "File", &manager.path().display().to_string());
    match config.validate() {
        Ok(()) => ui::check(&ctx, Mark::Ok, "Valid", None),
        Err(reason) => {
            ui::check(&ctx, Mark::Fail, "Invalid", Some(&reason));
            all_ok = false;
        }
    }
    ui::key_value(&ctx, "Queue", &describe_queue(&config.queue));
    ui::key_value(
        &ctx,
        "Mode",
        &format!("{:?}", config.listener.effective_mode(&config.queue)).to_lowercase(),
    );
    ui::key_value(&ctx, "Storage", &config.storage.root);
    let categories: Vec<&str> = config
        .storage
        .categories
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    ui::key_value(&ctx, "Categories", &categories.join(", "));
    ui::key_value(
        &ctx,
        "Logs",
        &ConfigManager::log_dir(&config).display().to_string(),
    );

    ui::section(&ctx, "Tools");
    for (program, args) in required_tools(&config) {
        all_ok &= check_tool(&ctx, &runner, &program, args).await;
    }

    ui::section(&ctx, "Working copy");
    all_ok &= check_working_copy(&ctx, &runner, &config).await;

    if all_ok {
        ui::outro(&ctx, Mark::Ok, "All checks passed");
    } else {
        ui::outro(&ctx, Mark::Warn, "Some checks failed - see above for details");
    }

    Ok(())
}

fn describe_queue(queue: &QueueConfig) -> String {
    match queue {
        QueueConfig::Sqs(_) => format!("SQS {}", queue.describe()),
        QueueConfig::ServiceBus(_) => format!("Service Bus {}", queue.describe()),
    }
}

/// Executables the configured providers shell out to, with a version check
fn required_tools(config: &Config) -> Vec<(String, &'static [&'static str])> {
    let mut tools = vec![(config.tools.git.clone(), &["--version"][..])];

    let needs_aws = matches!(config.queue, QueueConfig::Sqs(_))
        || config.storage.provider == StorageProvider::S3;
    if needs_aws {
        tools.push((config.tools.aws.clone(), &["--version"][..]));
    }
    if config.storage.provider == StorageProvider::AzureBlob {
        tools.push((config.tools.azcopy.clone(), &["--version"][..]));
    }
    tools
}

async fn check_tool(ctx: &UiContext, runner: &ProcessRunner, program: &str, args: &[&str]) -> bool {
    let spec = CommandSpec::new(program).args(args.iter().copied()).quiet();
    match runner.run(&spec).await {
        Ok(output) => {
            let version = first_line(&output.stdout)
                .or_else(|| first_line(&output.stderr))
                .unwrap_or("installed");
            ui::check(ctx, Mark::Ok, program, Some(version));
            true
        }
        Err(RefresherError::CommandFailed { .. }) => {
            ui::check(ctx, Mark::Fail, program, Some("not found on PATH"));
            false
        }
        Err(e) => {
            ui::check(ctx, Mark::Fail, program, Some(&e.to_string()));
            false
        }
    }
}

async fn check_working_copy(ctx: &UiContext, runner: &ProcessRunner, config: &Config) -> bool {
    let working_copy = &config.repository.working_copy;
    ui::key_value(ctx, "Path", &working_copy.display().to_string());

    if !working_copy.join(".git").exists() {
        ui::check(
            ctx,
            Mark::Warn,
            "Not cloned yet",
            Some("listen or refresh will clone it"),
        );
        return true;
    }

    let head = CommandSpec::new(&config.tools.git)
        .args(["log", "-1", "--format=%h %cd", "--date=iso"])
        .current_dir(working_copy)
        .quiet();
    match runner.run(&head).await {
        Ok(output) => {
            let commit = first_line(&output.stdout).unwrap_or("unknown");
            ui::check(ctx, Mark::Ok, "Cloned", Some(commit));
        }
        Err(e) => {
            ui::check(ctx, Mark::Fail, "Unreadable", Some(&e.to_string()));
            return false;
        }
    }

    let (mark, label, detail) = listener_state(working_copy);
    ui::check(ctx, mark, label, detail.as_deref());

    true
}

/// Reads the lock without owning it, so a listener starting meanwhile still wins
fn listener_state(working_copy: &Path) -> (Mark, &'static str, Option<String>) {
    match WorkingCopyLock::is_held(working_copy) {
        Ok(true) => (Mark::Ok, "Listener running", None),
        Ok(false) => (Mark::Warn, "No listener running", None),
        Err(e) => (Mark::Warn, "Lock state unknown", Some(e.to_string())),
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}
