//! Working copy synchronization
//!
//! The working copy always takes the remote's state: local edits and
//! untracked files are thrown away on every refresh.

use crate::error::{RefresherError, RefresherResult};
use crate::exec::{CommandRunner, CommandSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Keeps one local working copy in step with one remote repository
pub struct Repository {
    runner: Arc<dyn CommandRunner>,
    git: String,
    url: String,
    working_copy: PathBuf,
}

impl Repository {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        git: impl Into<String>,
        url: impl Into<String>,
        working_copy: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            git: git.into(),
            url: url.into(),
            working_copy: working_copy.into(),
        }
    }

    pub fn working_copy(&self) -> &Path {
        &self.working_copy
    }

    /// Whether the working copy already carries git metadata
    pub async fn is_cloned(&self) -> bool {
        fs::try_exists(self.working_copy.join(".git"))
            .await
            .unwrap_or(false)
    }

    /// Clone the repository unless the working copy already exists
    ///
    /// Safe to call on every startup. A directory that exists but is not a
    /// clone (or is corrupt) makes the clone fail; that is left for the
    /// operator to resolve.
    pub async fn ensure(&self) -> RefresherResult<()> {
        if self.is_cloned().await {
            debug!("Working copy present at {}", self.working_copy.display());
            return Ok(());
        }

        if let Some(parent) = self.working_copy.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                RefresherError::WorkingCopyUnusable {
                    path: self.working_copy.clone(),
                    reason: format!("cannot create {}: {}", parent.display(), e),
                }
            })?;
        }

        info!("Cloning repo into {}", self.working_copy.display());
        let clone = CommandSpec::new(&self.git)
            .arg("clone")
            .arg(&self.url)
            .arg(self.working_copy.to_string_lossy());
        self.runner
            .run(&clone)
            .await
            .map_err(|e| RefresherError::repository("clone", e))?;

        Ok(())
    }

    /// Force the working copy to match the remote branch head
    ///
    /// Stops at the first failing step. The working copy may then be
    /// inconsistent until the next successful refresh.
    pub async fn refresh(&self) -> RefresherResult<()> {
        let steps: [(&'static str, &[&str]); 4] = [
            ("reset", &["reset", "--hard"]),
            ("clean", &["clean", "-fd"]),
            ("fetch", &["fetch", "--all"]),
            ("pull", &["pull", "--rebase"]),
        ];

        for (step, args) in steps {
            let spec = CommandSpec::new(&self.git)
                .args(args.iter().copied())
                .current_dir(&self.working_copy);
            self.runner
                .run(&spec)
                .await
                .map_err(|e| RefresherError::repository(step, e))?;
        }

        debug!("Working copy refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::fake::ScriptedRunner;
    use tempfile::TempDir;

    fn repository(runner: &Arc<ScriptedRunner>, wc: &Path) -> Repository {
        Repository::new(
            runner.clone(),
            "git",
            "https://github.com/example-org/Munki.git",
            wc,
        )
    }

    #[tokio::test]
    async fn ensure_clones_missing_working_copy() {
        let temp = TempDir::new().unwrap();
        let wc = temp.path().join("Munki");
        let runner = Arc::new(ScriptedRunner::new());

        repository(&runner, &wc).ensure().await.unwrap();

        let lines = runner.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("git clone https://github.com/example-org/Munki.git"));
        assert!(runner.specs()[0].cwd().is_none());
    }

    #[tokio::test]
    async fn ensure_skips_existing_clone() {
        let temp = TempDir::new().unwrap();
        let wc = temp.path().join("Munki");
        std::fs::create_dir_all(wc.join(".git")).unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        let repo = repository(&runner, &wc);
        repo.ensure().await.unwrap();
        repo.ensure().await.unwrap();

        assert!(runner.lines().is_empty());
    }

    #[tokio::test]
    async fn ensure_reports_clone_failure() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_when("clone", "repository not found");

        let err = repository(&runner, &temp.path().join("wc"))
            .ensure()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RefresherError::RepositorySync { step: "clone", .. }
        ));
    }

    #[tokio::test]
    async fn refresh_runs_steps_in_order_inside_working_copy() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        repository(&runner, temp.path()).refresh().await.unwrap();

        assert_eq!(
            runner.lines(),
            vec![
                "git reset --hard",
                "git clean -fd",
                "git fetch --all",
                "git pull --rebase",
            ]
        );
        assert!(runner
            .specs()
            .iter()
            .all(|spec| spec.cwd() == Some(temp.path())));
    }

    #[tokio::test]
    async fn refresh_stops_at_first_failure() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_when("fetch", "could not resolve host");

        let err = repository(&runner, temp.path()).refresh().await.unwrap_err();

        assert!(matches!(
            err,
            RefresherError::RepositorySync { step: "fetch", .. }
        ));
        assert_eq!(runner.lines().len(), 3);
        assert!(!runner.lines().iter().any(|l| l.contains("pull")));
    }
}
