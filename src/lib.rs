//! Cache Refresher - event-driven mirror of a software repository
//!
//! Listens for "repository changed" notifications on a queue and, for each
//! one, resets a local git working copy to upstream and mirrors the large
//! asset trees from object storage into it.

pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod listener;
pub mod lock;
pub mod logging;
pub mod queue;
pub mod refresh;
pub mod sync;
pub mod ui;

pub use error::{RefresherError, RefresherResult};
