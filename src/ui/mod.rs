//! Operator-facing terminal output
//!
//! Uses `cliclack` when attached to a terminal and falls back to plain,
//! greppable lines under service managers and CI.

mod context;
mod output;

pub use context::UiContext;
pub use output::{check, intro, key_value, outro, section, Mark};
