//! Asset directory mirroring
//!
//! Each category is mirrored one way from object storage with delete
//! semantics. Convergence comes from re-running the tool, so nothing here
//! cleans up after an interrupted sync.

use crate::config::schema::{AssetCategory, StorageConfig, StorageProvider, ToolsConfig};
use crate::error::{RefresherError, RefresherResult};
use crate::exec::{CommandRunner, CommandSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

/// The sync tool used for one storage provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorTool {
    /// `aws s3 sync`
    AwsS3 { aws: String },
    /// `azcopy sync`, with an optional SAS token appended to the source URL
    AzCopy { azcopy: String, sas: Option<String> },
}

impl MirrorTool {
    pub fn from_config(storage: &StorageConfig, tools: &ToolsConfig) -> Self {
        match storage.provider {
            StorageProvider::S3 => Self::AwsS3 {
                aws: tools.aws.clone(),
            },
            StorageProvider::AzureBlob => Self::AzCopy {
                azcopy: tools.azcopy.clone(),
                sas: storage.sas_token.clone(),
            },
        }
    }

    /// Build the sync command mirroring `remote` into `local`
    pub fn command(&self, remote: &str, local: &Path, exclude: &[String]) -> CommandSpec {
        let local = local.to_string_lossy().into_owned();
        match self {
            Self::AwsS3 { aws } => {
                let mut spec = CommandSpec::new(aws)
                    .args(["s3", "sync"])
                    .arg(remote)
                    .arg(local)
                    .arg("--delete");
                for pattern in exclude {
                    spec = spec
                        .arg("--exclude")
                        .arg(pattern)
                        .arg("--exclude")
                        .arg(format!("*/{}", pattern));
                }
                spec
            }
            Self::AzCopy { azcopy, sas } => {
                let sas = sas.as_deref().unwrap_or_default();
                let source = if sas.is_empty() || sas.starts_with('?') {
                    format!("{}{}", remote, sas)
                } else {
                    format!("{}?{}", remote, sas)
                };
                let mut spec = CommandSpec::new(azcopy)
                    .arg("sync")
                    .arg(source)
                    .arg(local)
                    .args(["--recursive", "--delete-destination=true"])
                    .redact(sas.trim_start_matches('?'));
                if !exclude.is_empty() {
                    spec = spec.arg("--exclude-pattern").arg(exclude.join(";"));
                }
                spec
            }
        }
    }
}

/// Mirrors asset categories from the storage root into the working copy
pub struct AssetMirror {
    runner: Arc<dyn CommandRunner>,
    tool: MirrorTool,
    root: String,
    working_copy: PathBuf,
    exclude: Vec<String>,
}

impl AssetMirror {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        tool: MirrorTool,
        root: impl Into<String>,
        working_copy: impl Into<PathBuf>,
        exclude: Vec<String>,
    ) -> Self {
        Self {
            runner,
            tool,
            root: root.into(),
            working_copy: working_copy.into(),
            exclude,
        }
    }

    /// Remote URI for a category
    pub fn remote_uri(&self, category: &AssetCategory) -> String {
        format!(
            "{}/{}",
            self.root.trim_end_matches('/'),
            category.remote.trim_matches('/')
        )
    }

    /// Local directory for a category
    pub fn local_dir(&self, category: &AssetCategory) -> PathBuf {
        self.working_copy.join(&category.local)
    }

    /// Mirror one category, deleting local files absent remotely
    pub async fn sync(&self, category: &AssetCategory) -> RefresherResult<()> {
        let remote = self.remote_uri(category);
        let local = self.local_dir(category);

        fs::create_dir_all(&local).await.map_err(|e| {
            RefresherError::asset(
                &category.name,
                RefresherError::io(format!("creating {}", local.display()), e),
            )
        })?;

        info!("Syncing {} from object storage", category.name);
        let spec = self.tool.command(&remote, &local, &self.exclude);
        self.runner
            .run(&spec)
            .await
            .map_err(|e| RefresherError::asset(&category.name, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::fake::ScriptedRunner;
    use tempfile::TempDir;

    fn excludes() -> Vec<String> {
        vec![".DS_Store".to_string()]
    }

    #[test]
    fn s3_command_deletes_and_excludes_noise() {
        let tool = MirrorTool::AwsS3 {
            aws: "/opt/homebrew/bin/aws".to_string(),
        };
        let spec = tool.command(
            "s3://munki-prod-bucket/repo/deployment/pkgs",
            Path::new("/Users/Shared/Munki/deployment/pkgs"),
            &excludes(),
        );

        assert_eq!(
            spec.to_string(),
            "/opt/homebrew/bin/aws s3 sync s3://munki-prod-bucket/repo/deployment/pkgs \
             /Users/Shared/Munki/deployment/pkgs --delete --exclude .DS_Store --exclude */.DS_Store"
        );
    }

    #[test]
    fn azcopy_command_appends_and_hides_sas() {
        let tool = MirrorTool::AzCopy {
            azcopy: "azcopy".to_string(),
            sas: Some("?sv=2023-11-03&sig=abc".to_string()),
        };
        let spec = tool.command(
            "https://acct.blob.core.windows.net/munki/repo/deployment/icons",
            Path::new("/srv/munki/deployment/icons"),
            &excludes(),
        );

        assert_eq!(
            spec.arg_list()[1],
            "https://acct.blob.core.windows.net/munki/repo/deployment/icons?sv=2023-11-03&sig=abc"
        );
        let shown = spec.to_string();
        assert!(!shown.contains("sig=abc"));
        assert!(shown.contains("--delete-destination=true"));
        assert!(shown.contains("--exclude-pattern .DS_Store"));
    }

    #[test]
    fn azcopy_adds_missing_question_mark() {
        let tool = MirrorTool::AzCopy {
            azcopy: "azcopy".to_string(),
            sas: Some("sv=1&sig=x".to_string()),
        };
        let spec = tool.command("https://a/b", Path::new("/l"), &[]);
        assert_eq!(spec.arg_list()[1], "https://a/b?sv=1&sig=x");
        assert!(!spec.arg_list().iter().any(|a| a == "--exclude-pattern"));
    }

    #[test]
    fn uris_join_root_and_category() {
        let mirror = AssetMirror::new(
            Arc::new(ScriptedRunner::new()),
            MirrorTool::AwsS3 {
                aws: "aws".to_string(),
            },
            "s3://bucket/repo/",
            "/srv/munki",
            excludes(),
        );
        let category = AssetCategory::deployment("catalogs");

        assert_eq!(
            mirror.remote_uri(&category),
            "s3://bucket/repo/deployment/catalogs"
        );
        assert_eq!(
            mirror.local_dir(&category),
            PathBuf::from("/srv/munki/deployment/catalogs")
        );
    }

    #[tokio::test]
    async fn sync_creates_local_dir_and_runs_tool() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let mirror = AssetMirror::new(
            runner.clone(),
            MirrorTool::AwsS3 {
                aws: "aws".to_string(),
            },
            "s3://bucket/repo",
            temp.path(),
            excludes(),
        );

        mirror.sync(&AssetCategory::deployment("pkgs")).await.unwrap();

        assert!(temp.path().join("deployment/pkgs").is_dir());
        assert_eq!(runner.lines().len(), 1);
        assert!(runner.lines()[0].starts_with("aws s3 sync s3://bucket/repo/deployment/pkgs"));
    }

    #[tokio::test]
    async fn sync_failure_names_category() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_when("deployment/icons", "AccessDenied");
        let mirror = AssetMirror::new(
            runner.clone(),
            MirrorTool::AwsS3 {
                aws: "aws".to_string(),
            },
            "s3://bucket/repo",
            temp.path(),
            excludes(),
        );

        let err = mirror
            .sync(&AssetCategory::deployment("icons"))
            .await
            .unwrap_err();

        match err {
            RefresherError::AssetSync { category, .. } => assert_eq!(category, "icons"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
