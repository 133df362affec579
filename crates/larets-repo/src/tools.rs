//! External tool capabilities: version control and chart indexing
//!
//! Git work shells out to the system `git` binary. Chart indexing is done
//! natively from the archives on disk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use larets_core::archive::read_chart_metadata;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::{RepoError, Result};
use crate::index::{ChartEntry, ChartIndex};
use crate::paths::write_atomic;

/// One line of history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub id: String,
    pub summary: String,
}

/// Version control operations on bare repositories
#[async_trait]
pub trait VersionControlTool: Send + Sync {
    /// Create a bare repository whose HEAD points at `branch`
    async fn init_bare(&self, path: &Path, branch: &str) -> Result<()>;

    /// Mirror-clone `url` into `path`
    async fn mirror_clone(&self, url: &str, path: &Path) -> Result<()>;

    /// Update a mirror from all of its remotes
    async fn fetch_all(&self, path: &Path) -> Result<()>;

    async fn list_branches(&self, path: &Path) -> Result<Vec<String>>;

    /// Most recent commits reachable from HEAD, newest first
    async fn log(&self, path: &Path, limit: usize) -> Result<Vec<CommitSummary>>;

    /// Create `branch` at `base`, or at HEAD when no base is given
    async fn create_branch(&self, path: &Path, branch: &str, base: Option<&str>) -> Result<()>;

    async fn delete_branch(&self, path: &Path, branch: &str) -> Result<()>;
}

/// Chart index generation
#[async_trait]
pub trait PackagingTool: Send + Sync {
    /// Rebuild `index_path` from the archives in `charts_dir`
    ///
    /// Each entry's download URL is `<download_base>/<file>`.
    async fn build_index(
        &self,
        charts_dir: &Path,
        download_base: &str,
        index_path: &Path,
    ) -> Result<ChartIndex>;
}

/// Reject ref names git would read as options or refuse outright
pub fn check_ref_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.starts_with('-')
        || name.starts_with('/')
        || name.ends_with('/')
        || name.ends_with(".lock")
        || name.contains("..")
        || name.contains("@{")
        || name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c));
    if bad {
        return Err(RepoError::invalid(format!("invalid branch name '{}'", name)));
    }
    Ok(())
}

/// `git` command line wrapper
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: PathBuf,
    timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

/// How a failed command is reported
#[derive(Clone, Copy)]
enum Facing<'a> {
    /// Talks to a remote; failures are remote fetch errors
    Network(&'a str),
    /// Works on the local repository; failures are storage errors
    Local(&'a Path),
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: PathBuf::from("git"),
            timeout,
        }
    }

    /// Use a specific git binary
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self, dir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn output(&self, mut cmd: Command, operation: &str) -> Result<std::process::Output> {
        debug!(operation, "spawning git");

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(RepoError::Internal {
                message: format!("failed to spawn {}: {}", operation, e),
            }),
            Err(_) => Err(RepoError::Timeout {
                operation: operation.to_string(),
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    /// Run a command and return its stdout, mapping failure by `facing`
    async fn run(&self, cmd: Command, operation: &str, facing: Facing<'_>) -> Result<String> {
        let output = self.output(cmd, operation).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = format!("{} failed ({}): {}", operation, output.status, stderr.trim());
            return Err(match facing {
                Facing::Network(url) => RepoError::remote(url, None, message),
                Facing::Local(path) => RepoError::storage(path, message),
            });
        }

        debug!(operation, "git succeeded");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Whether the repository has any commit at HEAD
    async fn has_head(&self, path: &Path) -> Result<bool> {
        let mut cmd = self.command(Some(path));
        cmd.args(["rev-parse", "--verify", "--quiet", "HEAD"]);
        let output = self.output(cmd, "git rev-parse").await?;
        Ok(output.status.success())
    }
}

#[async_trait]
impl VersionControlTool for GitCli {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn init_bare(&self, path: &Path, branch: &str) -> Result<()> {
        check_ref_name(branch)?;

        let mut cmd = self.command(None);
        cmd.args(["init", "--bare", "--quiet"]).arg(path);
        self.run(cmd, "git init --bare", Facing::Local(path)).await?;

        let mut cmd = self.command(Some(path));
        cmd.arg("symbolic-ref")
            .arg("HEAD")
            .arg(format!("refs/heads/{}", branch));
        self.run(cmd, "git symbolic-ref", Facing::Local(path)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn mirror_clone(&self, url: &str, path: &Path) -> Result<()> {
        let mut cmd = self.command(None);
        cmd.args(["clone", "--mirror", "--quiet", "--"])
            .arg(url)
            .arg(path);
        self.run(cmd, "git clone --mirror", Facing::Network(url))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn fetch_all(&self, path: &Path) -> Result<()> {
        let origin = path.display().to_string();
        let mut cmd = self.command(Some(path));
        cmd.args(["fetch", "--all", "--prune", "--quiet"]);
        self.run(cmd, "git fetch --all", Facing::Network(&origin))
            .await?;
        Ok(())
    }

    async fn list_branches(&self, path: &Path) -> Result<Vec<String>> {
        let mut cmd = self.command(Some(path));
        cmd.args(["branch", "--list", "--format=%(refname:short)"]);
        let stdout = self.run(cmd, "git branch --list", Facing::Local(path)).await?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn log(&self, path: &Path, limit: usize) -> Result<Vec<CommitSummary>> {
        // A fresh bare repository has no history
        if !self.has_head(path).await? {
            return Ok(Vec::new());
        }

        let mut cmd = self.command(Some(path));
        cmd.arg("log")
            .arg("--format=%H%x09%s")
            .arg("-n")
            .arg(limit.to_string());
        let stdout = self.run(cmd, "git log", Facing::Local(path)).await?;

        Ok(stdout
            .lines()
            .filter_map(|line| {
                let (id, summary) = line.split_once('\t')?;
                Some(CommitSummary {
                    id: id.to_string(),
                    summary: summary.to_string(),
                })
            })
            .collect())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_branch(&self, path: &Path, branch: &str, base: Option<&str>) -> Result<()> {
        check_ref_name(branch)?;
        if let Some(base) = base {
            check_ref_name(base)?;
        }

        let mut cmd = self.command(Some(path));
        cmd.arg("branch").arg(branch);
        if let Some(base) = base {
            cmd.arg(base);
        }
        self.run(cmd, "git branch", Facing::Local(path)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn delete_branch(&self, path: &Path, branch: &str) -> Result<()> {
        check_ref_name(branch)?;

        let mut cmd = self.command(Some(path));
        cmd.args(["branch", "-D"]).arg(branch);
        self.run(cmd, "git branch -D", Facing::Local(path)).await?;
        Ok(())
    }
}

/// Builds `index.yaml` by reading every chart archive in a directory
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeIndexer;

impl NativeIndexer {
    fn scan(charts_dir: &Path, download_base: &str) -> Result<ChartIndex> {
        let mut index = ChartIndex::default();

        let entries = match std::fs::read_dir(charts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(index),
            Err(e) => return Err(RepoError::storage(charts_dir, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| RepoError::storage(charts_dir, e))?;
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') || !file_name.ends_with(".tgz") {
                continue;
            }

            let meta = read_chart_metadata(&path).map_err(|e| {
                RepoError::invalid(format!("{} is not a valid chart: {}", file_name, e))
            })?;
            let content = std::fs::read(&path).map_err(|e| RepoError::storage(&path, e))?;
            let digest = hex::encode(Sha256::digest(&content));
            let created: DateTime<Utc> = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());

            let url = format!("{}/{}", download_base.trim_end_matches('/'), file_name);
            index.add_entry(ChartEntry::from_metadata(meta, url, digest, created));
        }

        index.sort_entries();
        Ok(index)
    }
}

#[async_trait]
impl PackagingTool for NativeIndexer {
    #[instrument(skip(self), fields(charts = %charts_dir.display()))]
    async fn build_index(
        &self,
        charts_dir: &Path,
        download_base: &str,
        index_path: &Path,
    ) -> Result<ChartIndex> {
        let dir = charts_dir.to_path_buf();
        let base = download_base.to_string();
        let index = tokio::task::spawn_blocking(move || Self::scan(&dir, &base)).await??;

        write_atomic(index_path, index.to_yaml()?.as_bytes()).await?;
        debug!(charts = index.len(), "chart index written");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_tgz;
    use tempfile::TempDir;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_check_ref_name() {
        assert!(check_ref_name("main").is_ok());
        assert!(check_ref_name("feature/login").is_ok());

        assert!(check_ref_name("").is_err());
        assert!(check_ref_name("-delete").is_err());
        assert!(check_ref_name("a..b").is_err());
        assert!(check_ref_name("has space").is_err());
        assert!(check_ref_name("topic.lock").is_err());
    }

    #[tokio::test]
    async fn test_native_indexer() {
        let temp = TempDir::new().unwrap();
        let charts = temp.path().join("charts");
        std::fs::create_dir_all(&charts).unwrap();
        write_tgz(
            &charts.join("mychart-1.0.0.tgz"),
            &[("mychart/Chart.yaml", "apiVersion: v2\nname: mychart\nversion: 1.0.0\n")],
        );
        write_tgz(
            &charts.join("mychart-1.1.0.tgz"),
            &[("mychart/Chart.yaml", "apiVersion: v2\nname: mychart\nversion: 1.1.0\n")],
        );
        std::fs::write(charts.join(".larets-x.partial"), "ignored").unwrap();

        let index_path = temp.path().join("index.yaml");
        let index = NativeIndexer
            .build_index(&charts, "http://localhost:8080/helm/charts/charts/", &index_path)
            .await
            .unwrap();

        assert_eq!(index.len(), 2);
        let latest = index.get_latest("mychart").unwrap();
        assert_eq!(latest.version, "1.1.0");
        assert_eq!(
            latest.download_url(),
            Some("http://localhost:8080/helm/charts/charts/mychart-1.1.0.tgz")
        );
        assert_eq!(latest.digest.as_ref().unwrap().len(), 64);

        let written = std::fs::read_to_string(&index_path).unwrap();
        let parsed = ChartIndex::from_yaml(&written).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[tokio::test]
    async fn test_native_indexer_missing_dir() {
        let temp = TempDir::new().unwrap();
        let index_path = temp.path().join("index.yaml");
        let index = NativeIndexer
            .build_index(&temp.path().join("charts"), "http://x", &index_path)
            .await
            .unwrap();
        assert!(index.is_empty());
        assert!(index_path.exists());
    }

    #[tokio::test]
    async fn test_native_indexer_rejects_invalid_chart() {
        let temp = TempDir::new().unwrap();
        let charts = temp.path().join("charts");
        std::fs::create_dir_all(&charts).unwrap();
        write_tgz(&charts.join("broken-1.0.0.tgz"), &[("broken/README.md", "no chart")]);

        let err = NativeIndexer
            .build_index(&charts, "http://x", &temp.path().join("index.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_git_init_bare_and_branches() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo.git");
        let git = GitCli::new(Duration::from_secs(30));

        git.init_bare(&repo, "main").await.unwrap();
        assert!(repo.join("HEAD").exists());
        let head = std::fs::read_to_string(repo.join("HEAD")).unwrap();
        assert_eq!(head.trim(), "ref: refs/heads/main");

        assert!(git.list_branches(&repo).await.unwrap().is_empty());
        assert!(git.log(&repo, 10).await.unwrap().is_empty());

        let err = git.create_branch(&repo, "feature", None).await.unwrap_err();
        assert!(matches!(err, RepoError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_git_clone_failure_is_remote() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let git = GitCli::new(Duration::from_secs(30));
        let missing = temp.path().join("does-not-exist.git");

        let err = git
            .mirror_clone(&missing.display().to_string(), &temp.path().join("mirror"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::RemoteFetch { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_internal() {
        let temp = TempDir::new().unwrap();
        let git = GitCli::default().with_binary("/nonexistent/git-binary");
        let err = git.init_bare(&temp.path().join("r"), "master").await.unwrap_err();
        assert!(matches!(err, RepoError::Internal { .. }));
    }
}
