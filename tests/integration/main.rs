//! Integration tests for cache-refresher

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use cache_refresher::lock::WorkingCopyLock;
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn refresher() -> Command {
        let mut cmd = cargo_bin_cmd!("cache-refresher");
        cmd.env_remove("CACHE_REFRESHER_CONFIG");
        cmd
    }

    fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        refresher()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Event-driven cache refresher"));
    }

    #[test]
    fn version_displays() {
        refresher()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cache-refresher"));
    }

    #[test]
    fn config_path() {
        refresher()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let temp = TempDir::new().unwrap();
        refresher()
            .arg("--config")
            .arg(temp.path().join("missing.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[queue]"))
            .stdout(predicate::str::contains("provider = \"sqs\""));
    }

    #[test]
    fn config_init_writes_file_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        refresher()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success();
        assert!(path.exists());

        std::fs::write(&path, "# edited\n").unwrap();
        refresher()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited\n");
    }

    #[test]
    fn listen_without_config_fails() {
        let temp = TempDir::new().unwrap();
        refresher()
            .arg("--config")
            .arg(temp.path().join("missing.toml"))
            .arg("listen")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration file not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn listen_with_incomplete_config_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(
            temp.path(),
            "[queue]\nprovider = \"sqs\"\nurl = \"https://sqs.us-east-1.amazonaws.com/123/munki\"\n",
        );

        refresher()
            .arg("--config")
            .arg(config)
            .arg("listen")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("repository.url"));
    }

    #[test]
    fn listen_refuses_second_instance() {
        let temp = TempDir::new().unwrap();
        let working_copy = temp.path().join("Munki");
        let logs = temp.path().join("logs");
        let config = write_config(
            temp.path(),
            &format!(
                r#"[queue]
provider = "sqs"
url = "https://sqs.us-east-1.amazonaws.com/123/munki"

[repository]
url = "https://git.example.invalid/munki.git"
working_copy = "{}"

[storage]
root = "s3://munki-bucket/repo"

[logging]
dir = "{}"
"#,
                working_copy.display(),
                logs.display()
            ),
        );

        let _held = WorkingCopyLock::try_acquire(&working_copy).unwrap();

        refresher()
            .arg("--config")
            .arg(config)
            .arg("listen")
            .assert()
            .failure()
            .stderr(predicate::str::contains("already holds the lock"));

        let errors = std::fs::read_to_string(logs.join("listener_error.log")).unwrap();
        assert!(errors.contains("Startup failed"));
    }

    #[test]
    fn listen_logs_unusable_queue_settings() {
        let temp = TempDir::new().unwrap();
        let working_copy = temp.path().join("Munki");
        std::fs::create_dir_all(working_copy.join(".git")).unwrap();
        let logs = temp.path().join("logs");
        let config = write_config(
            temp.path(),
            &format!(
                r#"[queue]
provider = "service-bus"
connection_string = "Endpoint=ftp://ns.example.invalid/;SharedAccessKeyName=listen;SharedAccessKey=abc"
topic = "munki-commits"
subscription = "cache-server-1"

[repository]
url = "https://git.example.invalid/munki.git"
working_copy = "{}"

[storage]
root = "s3://munki-bucket/repo"

[logging]
dir = "{}"
"#,
                working_copy.display(),
                logs.display()
            ),
        );

        refresher()
            .arg("--config")
            .arg(config)
            .arg("listen")
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid connection string"));

        let errors = std::fs::read_to_string(logs.join("listener_error.log")).unwrap();
        assert!(errors.contains("Failed to create queue client"));
        assert!(errors.contains("unsupported endpoint scheme"));
    }
}

mod repository_tests {
    use cache_refresher::exec::ProcessRunner;
    use cache_refresher::sync::Repository;
    use sha2::{Digest, Sha256};
    use std::path::{Path, PathBuf};
    use std::process::Command;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args([
                "-c",
                "user.name=Munki Admin",
                "-c",
                "user.email=admin@example.com",
                "-c",
                "init.defaultBranch=main",
            ])
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    /// A bare origin plus a seeding clone that can push new commits
    struct Upstream {
        _temp: TempDir,
        origin: PathBuf,
        seed: PathBuf,
        working_copy: PathBuf,
    }

    impl Upstream {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let origin = temp.path().join("origin.git");
            let seed = temp.path().join("seed");
            std::fs::create_dir_all(&origin).unwrap();
            std::fs::create_dir_all(&seed).unwrap();

            git(&origin, &["init", "--bare"]);
            git(&seed, &["init"]);
            git(&seed, &["remote", "add", "origin", origin.to_str().unwrap()]);

            let upstream = Self {
                working_copy: temp.path().join("cache").join("Munki"),
                _temp: temp,
                origin,
                seed,
            };
            upstream.commit("manifests/site_default", "<plist/>\n");
            upstream
        }

        fn commit(&self, file: &str, contents: &str) {
            let path = self.seed.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
            git(&self.seed, &["add", "-A"]);
            git(&self.seed, &["commit", "-m", &format!("update {}", file)]);
            git(&self.seed, &["push", "origin", "HEAD:main"]);
        }

        fn repository(&self) -> Repository {
            Repository::new(
                Arc::new(ProcessRunner::new()),
                "git",
                self.origin.to_str().unwrap(),
                &self.working_copy,
            )
        }
    }

    /// Hash of every path and file body under `root`, excluding `.git`
    fn tree_digest(root: &Path) -> String {
        fn walk(dir: &Path, root: &Path, entries: &mut Vec<(String, Vec<u8>)>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.file_name().is_some_and(|n| n == ".git") {
                    continue;
                }
                let rel = path.strip_prefix(root).unwrap().display().to_string();
                if path.is_dir() {
                    entries.push((rel, Vec::new()));
                    walk(&path, root, entries);
                } else {
                    entries.push((rel, std::fs::read(&path).unwrap()));
                }
            }
        }

        let mut entries = Vec::new();
        walk(root, root, &mut entries);
        entries.sort();

        let mut hasher = Sha256::new();
        for (rel, body) in entries {
            hasher.update(rel.as_bytes());
            hasher.update([0]);
            hasher.update(&body);
        }
        format!("{:x}", hasher.finalize())
    }

    #[tokio::test]
    async fn ensure_clones_once() {
        if !git_available() {
            return;
        }
        let upstream = Upstream::new();
        let repo = upstream.repository();

        assert!(!repo.is_cloned().await);
        repo.ensure().await.unwrap();
        assert!(repo.is_cloned().await);
        assert!(upstream.working_copy.join("manifests/site_default").exists());

        std::fs::write(upstream.working_copy.join("marker"), "kept").unwrap();
        repo.ensure().await.unwrap();
        assert!(upstream.working_copy.join("marker").exists());
    }

    #[tokio::test]
    async fn refresh_discards_local_drift() {
        if !git_available() {
            return;
        }
        let upstream = Upstream::new();
        let repo = upstream.repository();
        repo.ensure().await.unwrap();

        let wc = &upstream.working_copy;
        std::fs::write(wc.join("manifests/site_default"), "tampered").unwrap();
        std::fs::write(wc.join("stray.txt"), "untracked").unwrap();
        std::fs::create_dir_all(wc.join("scratch/deep")).unwrap();
        std::fs::write(wc.join("scratch/deep/file"), "untracked").unwrap();

        repo.refresh().await.unwrap();

        assert_eq!(
            std::fs::read_to_string(wc.join("manifests/site_default")).unwrap(),
            "<plist/>\n"
        );
        assert!(!wc.join("stray.txt").exists());
        assert!(!wc.join("scratch").exists());
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        if !git_available() {
            return;
        }
        let upstream = Upstream::new();
        let repo = upstream.repository();
        repo.ensure().await.unwrap();

        repo.refresh().await.unwrap();
        let first = tree_digest(&upstream.working_copy);
        repo.refresh().await.unwrap();
        assert_eq!(tree_digest(&upstream.working_copy), first);
    }

    #[tokio::test]
    async fn refresh_picks_up_new_commits() {
        if !git_available() {
            return;
        }
        let upstream = Upstream::new();
        let repo = upstream.repository();
        repo.ensure().await.unwrap();

        upstream.commit("pkgsinfo/Firefox-128.0.plist", "<dict/>\n");
        repo.refresh().await.unwrap();

        assert!(upstream
            .working_copy
            .join("pkgsinfo/Firefox-128.0.plist")
            .exists());
    }
}
