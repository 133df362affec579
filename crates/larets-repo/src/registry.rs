//! Repository lifecycle
//!
//! A repository exists when both its record and its storage directory do.
//! Creation allocates the directory, persists the record and lays down the
//! format's initial content; any failure after allocation undoes the earlier
//! steps before the error is returned.

use chrono::Utc;
use larets_core::{Format, FormatOptions, GroupMember, Repository, RepositoryType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::FormatToggles;
use crate::error::{RepoError, Result};
use crate::flight::KeyedLocks;
use crate::format::{Bootstrap, adapter};
use crate::index::ChartIndex;
use crate::paths::{StoragePaths, write_atomic};
use crate::remote::HttpOrigin;
use crate::store::{MetadataStore, NewRepository};
use crate::tools::{CommitSummary, VersionControlTool, check_ref_name};

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("valid regex")
});

/// Number of commits reported by [`RepositoryRegistry::git_info`]
pub const RECENT_COMMITS: usize = 10;

/// Parameters of a new repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateRepository {
    pub name: String,
    #[serde(rename = "type")]
    pub repo_type: Option<RepositoryType>,
    pub url: String,
    pub description: String,
    /// Defaults to enabled
    pub cache_enabled: Option<bool>,
    /// Defaults to the engine's default cache TTL
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Option<Duration>,
    /// Git default branch
    pub branch: Option<String>,
    /// Helm index location, relative to the repository root
    pub index_path: Option<String>,
}

impl CreateRepository {
    pub fn new(name: impl Into<String>, repo_type: RepositoryType) -> Self {
        Self {
            name: name.into(),
            repo_type: Some(repo_type),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// Git repository overview
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryInfo {
    pub repository: Repository,
    pub branches: Vec<String>,
    pub recent_commits: Vec<CommitSummary>,
}

/// Repository registry
pub struct RepositoryRegistry {
    store: Arc<dyn MetadataStore>,
    paths: StoragePaths,
    vcs: Arc<dyn VersionControlTool>,
    http: HttpOrigin,
    formats: FormatToggles,
    default_cache_ttl: Duration,
    locks: KeyedLocks<(Format, String)>,
}

impl RepositoryRegistry {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        paths: StoragePaths,
        vcs: Arc<dyn VersionControlTool>,
        http: HttpOrigin,
        formats: FormatToggles,
        default_cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            paths,
            vcs,
            http,
            formats,
            default_cache_ttl,
            locks: KeyedLocks::new(),
        }
    }

    pub fn ensure_enabled(&self, format: Format) -> Result<()> {
        if self.formats.is_enabled(format) {
            Ok(())
        } else {
            Err(RepoError::FormatDisabled { format })
        }
    }

    /// Look up a repository of an enabled format
    pub async fn resolve(&self, format: Format, name: &str) -> Result<Repository> {
        self.ensure_enabled(format)?;
        self.store.get_repository(format, name).await
    }

    /// Create a repository
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, format: Format, request: CreateRepository) -> Result<Repository> {
        self.ensure_enabled(format)?;
        let new = self.prepare(format, request)?;

        let _guard = self.locks.lock(&(format, new.name.clone())).await;

        if self.store.find_repository(format, &new.name).await?.is_some() {
            return Err(RepoError::DuplicateName {
                format,
                name: new.name,
            });
        }

        let root = self.paths.allocate(format, &new.name).await?;
        let new = NewRepository {
            storage_path: root.clone(),
            ..new
        };

        let repo = match self.store.insert_repository(new).await {
            Ok(repo) => repo,
            // Another process holds the name and the directory with it
            Err(e @ RepoError::DuplicateName { .. }) => return Err(e),
            Err(e) => {
                self.discard_dir(&root).await;
                return Err(e);
            }
        };

        if let Err(e) = self.bootstrap(&repo).await {
            warn!(
                repository = %repo.name,
                error = %e,
                "bootstrap failed, rolling back repository creation"
            );
            if let Err(cleanup) = self.store.delete_repository(repo.id).await {
                warn!(error = %cleanup, "failed to remove repository record during rollback");
            }
            self.discard_dir(&root).await;
            return Err(e);
        }

        info!(
            format = %format,
            repository = %repo.name,
            kind = %repo.repo_type,
            "created repository"
        );
        Ok(repo)
    }

    async fn discard_dir(&self, root: &Path) {
        if let Err(e) = self.paths.remove_dir(root).await {
            warn!(path = %root.display(), error = %e, "failed to remove repository directory during rollback");
        }
    }

    /// Validate a request and fill in defaults
    fn prepare(&self, format: Format, request: CreateRepository) -> Result<NewRepository> {
        let name = request.name.trim().to_string();
        if !NAME_PATTERN.is_match(&name) {
            return Err(RepoError::invalid(format!(
                "invalid repository name '{}': use letters, digits, '.', '_' or '-', starting with a letter or digit",
                request.name
            )));
        }

        let repo_type = request
            .repo_type
            .ok_or_else(|| RepoError::invalid("repository type is required"))?;

        let url = request.url.trim().to_string();
        match repo_type {
            RepositoryType::Proxy => {
                let parsed = url::Url::parse(&url).map_err(|e| {
                    RepoError::invalid(format!("proxy repository needs a valid url: {}", e))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(RepoError::invalid(format!(
                        "unsupported url scheme '{}'",
                        parsed.scheme()
                    )));
                }
            }
            RepositoryType::Hosted | RepositoryType::Group => {
                if !url.is_empty() {
                    return Err(RepoError::invalid(format!(
                        "url is only valid for proxy repositories, not {}",
                        repo_type
                    )));
                }
            }
        }

        let mut options = FormatOptions::defaults(format, repo_type);
        if let Some(requested) = request.branch {
            match &mut options {
                FormatOptions::Git { branch, .. } => {
                    check_ref_name(&requested)?;
                    *branch = requested;
                }
                _ => return Err(RepoError::invalid("branch is only valid for git repositories")),
            }
        }
        if let Some(requested) = request.index_path {
            match &mut options {
                FormatOptions::Helm { index_path } => {
                    check_index_path(&requested)?;
                    *index_path = requested;
                }
                _ => {
                    return Err(RepoError::invalid(
                        "indexPath is only valid for helm repositories",
                    ));
                }
            }
        }

        let cache_ttl = request.cache_ttl.unwrap_or(self.default_cache_ttl);

        Ok(NewRepository {
            format,
            name: name.clone(),
            description: request.description,
            repo_type,
            url,
            cache_enabled: request.cache_enabled.unwrap_or(true),
            cache_ttl,
            storage_path: self.paths.repository_root(format, &name),
            options,
            created_at: Utc::now(),
        })
    }

    async fn bootstrap(&self, repo: &Repository) -> Result<()> {
        let action = adapter(repo.format).bootstrap(repo.repo_type);
        debug!(repository = %repo.name, ?action, "bootstrapping");

        match action {
            Bootstrap::Nothing => Ok(()),
            Bootstrap::EmptyIndex => {
                let index_file = helm_index_file(repo)?;
                let yaml = ChartIndex::default().to_yaml()?;
                write_atomic(&index_file, yaml.as_bytes()).await?;
                Ok(())
            }
            Bootstrap::DownloadIndex => self.refresh_index(repo).await,
            Bootstrap::InitBare => {
                let branch = repo.branch().unwrap_or(larets_core::model::DEFAULT_GIT_BRANCH);
                self.vcs.init_bare(&repo.storage_path, branch).await
            }
            Bootstrap::MirrorClone => self.vcs.mirror_clone(&repo.url, &repo.storage_path).await,
        }
    }

    /// Download the origin's `index.yaml` into the repository's index file
    async fn refresh_index(&self, repo: &Repository) -> Result<()> {
        let url = format!("{}/index.yaml", repo.url.trim_end_matches('/'));
        let bytes = self.http.get_bytes(&url, None).await?;

        let index = ChartIndex::from_bytes(&bytes).map_err(|e| {
            RepoError::remote(&url, None, format!("origin did not serve a chart index: {}", e))
        })?;
        write_atomic(&helm_index_file(repo)?, &bytes).await?;

        debug!(repository = %repo.name, charts = index.len(), "index refreshed");
        Ok(())
    }

    pub async fn get(&self, format: Format, name: &str) -> Result<Repository> {
        self.resolve(format, name).await
    }

    pub async fn list(&self, format: Format) -> Result<Vec<Repository>> {
        self.ensure_enabled(format)?;
        self.store.list_repositories(format).await
    }

    /// Repository deletion is not supported
    pub async fn delete(&self, format: Format, name: &str) -> Result<()> {
        self.resolve(format, name).await?;
        Err(RepoError::not_implemented(format!(
            "delete {} repository",
            format
        )))
    }

    /// Refresh a proxy repository from its origin
    #[instrument(skip(self))]
    pub async fn sync(&self, format: Format, name: &str) -> Result<Repository> {
        let repo = self.resolve(format, name).await?;
        if !repo.is_proxy() {
            return Err(RepoError::wrong_type(
                &repo.name,
                RepositoryType::Proxy,
                repo.repo_type,
            ));
        }

        let _guard = self.locks.lock(&(format, repo.name.clone())).await;

        match format {
            Format::Git => self.vcs.fetch_all(&repo.storage_path).await?,
            Format::Helm => self.refresh_index(&repo).await?,
            Format::Docker => return Err(RepoError::not_implemented("sync docker repository")),
        }

        self.store.touch_repository(repo.id, Utc::now()).await?;
        info!(format = %format, repository = %repo.name, "synced repository");
        self.store.get_repository(format, name).await
    }

    /// Branches and recent history of a Git repository
    pub async fn git_info(&self, name: &str) -> Result<GitRepositoryInfo> {
        let repo = self.resolve(Format::Git, name).await?;
        let branches = self.vcs.list_branches(&repo.storage_path).await?;
        let recent_commits = self.vcs.log(&repo.storage_path, RECENT_COMMITS).await?;

        Ok(GitRepositoryInfo {
            repository: repo,
            branches,
            recent_commits,
        })
    }

    async fn hosted_git(&self, name: &str) -> Result<Repository> {
        let repo = self.resolve(Format::Git, name).await?;
        if !repo.is_hosted() {
            return Err(RepoError::wrong_type(
                &repo.name,
                RepositoryType::Hosted,
                repo.repo_type,
            ));
        }
        Ok(repo)
    }

    #[instrument(skip(self))]
    pub async fn create_branch(&self, name: &str, branch: &str, base: Option<&str>) -> Result<()> {
        let repo = self.hosted_git(name).await?;
        self.vcs
            .create_branch(&repo.storage_path, branch, base)
            .await?;
        info!(repository = %repo.name, branch, "created branch");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_branch(&self, name: &str, branch: &str) -> Result<()> {
        let repo = self.hosted_git(name).await?;
        self.vcs.delete_branch(&repo.storage_path, branch).await?;
        info!(repository = %repo.name, branch, "deleted branch");
        Ok(())
    }

    /// Add `member` to the group repository `group`
    #[instrument(skip(self))]
    pub async fn add_group_member(
        &self,
        format: Format,
        group: &str,
        member: &str,
        priority: i32,
    ) -> Result<Vec<GroupMember>> {
        let group_repo = self.resolve(format, group).await?;
        if !group_repo.is_group() {
            return Err(RepoError::wrong_type(
                &group_repo.name,
                RepositoryType::Group,
                group_repo.repo_type,
            ));
        }

        let member_repo = self.resolve(format, member).await?;
        if member_repo.is_group() {
            return Err(RepoError::invalid(format!(
                "group {} cannot contain another group ({})",
                group_repo.name, member_repo.name
            )));
        }

        self.store
            .add_group_member(group_repo.id, member_repo.id, priority)
            .await?;
        info!(group = %group_repo.name, member = %member_repo.name, priority, "added group member");
        self.store.group_members(group_repo.id).await
    }

    /// Members of a group in resolution order
    pub async fn group_members(&self, format: Format, group: &str) -> Result<Vec<GroupMember>> {
        let group_repo = self.resolve(format, group).await?;
        if !group_repo.is_group() {
            return Err(RepoError::wrong_type(
                &group_repo.name,
                RepositoryType::Group,
                group_repo.repo_type,
            ));
        }
        self.store.group_members(group_repo.id).await
    }

    /// Group resolution is not supported
    pub async fn resolve_group(&self, format: Format, group: &str) -> Result<Repository> {
        self.group_members(format, group).await?;
        Err(RepoError::not_implemented(format!(
            "resolve {} group",
            format
        )))
    }
}

fn helm_index_file(repo: &Repository) -> Result<std::path::PathBuf> {
    repo.index_file().ok_or_else(|| RepoError::Internal {
        message: format!("repository {} has no chart index", repo.name),
    })
}

/// The index must stay inside the repository root
fn check_index_path(path: &str) -> Result<()> {
    let p = Path::new(path);
    let escapes = p
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if path.is_empty() || escapes || !path.ends_with(".yaml") {
        return Err(RepoError::invalid(format!(
            "invalid indexPath '{}': must be a relative .yaml path inside the repository",
            path
        )));
    }
    Ok(())
}
