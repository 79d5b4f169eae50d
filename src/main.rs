//! Cache Refresher - keeps a local software repository cache current
//!
//! CLI entry point that dispatches to subcommands.

use cache_refresher::cli::{commands, Cli, Commands};
use cache_refresher::config::ConfigManager;
use cache_refresher::error::RefresherResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> RefresherResult<()> {
    let cli = Cli::parse();

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    match cli.command {
        // These own the log files and install their own subscriber
        Commands::Listen => commands::listen(&manager, cli.verbose).await,
        Commands::Refresh => commands::refresh(&manager, cli.verbose).await,
        Commands::Status => {
            init_console_logging(cli.verbose);
            commands::status(&manager).await
        }
        Commands::Config(args) => {
            init_console_logging(cli.verbose);
            commands::config(args, &manager).await
        }
    }
}

/// Stderr logging for the short-lived commands: 0 = warn, 1 = info, 2+ = debug
fn init_console_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::new("cache_refresher=warn"),
        1 => EnvFilter::new("cache_refresher=info"),
        _ => EnvFilter::new("cache_refresher=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}
