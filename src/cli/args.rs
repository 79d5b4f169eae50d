//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Cache Refresher - keep a local software repository in step with object storage
///
/// Listens for commit notifications on a queue and, for each one, refreshes
/// the git working copy and mirrors the pkgs, icons and catalogs trees.
#[derive(Parser, Debug)]
#[command(name = "cache-refresher")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Mirror log entries to stderr (-v), with debug detail (-vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CACHE_REFRESHER_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Listen for commit notifications and refresh the cache on each one
    Listen,

    /// Refresh the cache once and exit
    Refresh,

    /// Show configuration summary, tool availability and working copy state
    Status,

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
