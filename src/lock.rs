//! Single-instance guard for a working copy
//!
//! The lock lives next to the working copy (`<parent>/.<name>.lock`) rather
//! than inside it, since `git clean` would remove it. The advisory lock is
//! released when the guard drops or the process exits.

use crate::error::{RefresherError, RefresherResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Attempts made while another process briefly inspects the lock
const CONTENDED_ATTEMPTS: u32 = 5;
const CONTENDED_PAUSE: Duration = Duration::from_millis(50);

/// Held for as long as this process owns the working copy
#[derive(Debug)]
pub struct WorkingCopyLock {
    path: PathBuf,
    _file: File,
}

impl WorkingCopyLock {
    /// Lock file location for a working copy
    pub fn path_for(working_copy: &Path) -> PathBuf {
        let name = working_copy
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "working-copy".to_string());
        let parent = working_copy.parent().unwrap_or_else(|| Path::new("/"));
        parent.join(format!(".{}.lock", name))
    }

    /// Take the lock, retrying briefly if it is contended
    ///
    /// `status` holds a shared lock for an instant while inspecting; only a
    /// lock that stays held means another refresher is running.
    pub async fn acquire(working_copy: &Path) -> RefresherResult<Self> {
        let mut attempt = 1;
        loop {
            match Self::try_acquire(working_copy) {
                Err(RefresherError::AlreadyRunning(_)) if attempt < CONTENDED_ATTEMPTS => {
                    debug!("Working copy lock contended, attempt {}", attempt);
                    attempt += 1;
                    tokio::time::sleep(CONTENDED_PAUSE).await;
                }
                result => return result,
            }
        }
    }

    /// Take the lock in a single attempt
    pub fn try_acquire(working_copy: &Path) -> RefresherResult<Self> {
        let path = Self::path_for(working_copy);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RefresherError::io(format!("creating {}", parent.display()), e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| RefresherError::io(format!("opening lock {}", path.display()), e))?;

        // Called through the trait: newer std has inherent `File` lock
        // methods with a different error type.
        FileExt::try_lock_exclusive(&file).map_err(|e| {
            if is_contended(&e) {
                RefresherError::AlreadyRunning(working_copy.to_path_buf())
            } else {
                RefresherError::io(format!("locking {}", path.display()), e)
            }
        })?;

        Ok(Self { path, _file: file })
    }

    /// Whether another process holds the lock right now
    ///
    /// Takes a shared lock for the duration of the check only, and never
    /// creates the lock file.
    pub fn is_held(working_copy: &Path) -> RefresherResult<bool> {
        let path = Self::path_for(working_copy);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(RefresherError::io(format!("opening lock {}", path.display()), e))
            }
        };

        match FileExt::try_lock_shared(&file) {
            Ok(()) => Ok(false),
            Err(e) if is_contended(&e) => Ok(true),
            Err(e) => Err(RefresherError::io(format!("inspecting {}", path.display()), e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == fs2::lock_contended_error().kind()
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
