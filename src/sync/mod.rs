//! Local mirror synchronization: the git working copy and the asset directories

mod assets;
mod repository;

pub use assets::{AssetMirror, MirrorTool};
pub use repository::Repository;
