//! Engine facade: every repository and artifact operation in one place

use larets_core::{ArchiveExtractor, Artifact, Format, GroupMember, MetadataExtractor, Repository};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::info;

use crate::artifacts::ArtifactStore;
use crate::cache::FetchCache;
use crate::config::EngineConfig;
use crate::error::{RepoError, Result};
use crate::paths::StoragePaths;
use crate::registry::{CreateRepository, GitRepositoryInfo, RepositoryRegistry};
use crate::remote::HttpOrigin;
use crate::store::{MetadataStore, SearchHit, SqliteStore};
use crate::tools::{GitCli, NativeIndexer, PackagingTool, VersionControlTool};

/// Collaborators the engine is built from
pub struct EngineParts {
    pub store: Arc<dyn MetadataStore>,
    pub vcs: Arc<dyn VersionControlTool>,
    pub packaging: Arc<dyn PackagingTool>,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub http: HttpOrigin,
}

/// Repository engine
pub struct Engine {
    config: EngineConfig,
    registry: Arc<RepositoryRegistry>,
    artifacts: ArtifactStore,
    cache: FetchCache,
}

impl Engine {
    /// Wire the production collaborators: SQLite, `git`, native indexer
    pub fn open(config: EngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.storage_path)
            .map_err(|e| RepoError::storage(&config.storage_path, e))?;

        let store = SqliteStore::open(&config.database_path())?;
        let parts = EngineParts {
            store: Arc::new(store),
            vcs: Arc::new(GitCli::new(config.tool_timeout)),
            packaging: Arc::new(NativeIndexer),
            extractor: Arc::new(ArchiveExtractor),
            http: HttpOrigin::new(config.fetch_timeout)?,
        };

        info!(
            storage = %config.storage_path.display(),
            database = %config.database_path().display(),
            "engine ready"
        );
        Ok(Self::from_parts(config, parts))
    }

    pub fn from_parts(config: EngineConfig, parts: EngineParts) -> Self {
        let paths = StoragePaths::new(&config.storage_path);

        let registry = Arc::new(RepositoryRegistry::new(
            Arc::clone(&parts.store),
            paths.clone(),
            parts.vcs,
            parts.http.clone(),
            config.formats,
            config.default_cache_ttl,
        ));
        let artifacts = ArtifactStore::new(
            Arc::clone(&parts.store),
            Arc::clone(&registry),
            paths,
            parts.packaging,
            Arc::clone(&parts.extractor),
            config.base_url.clone(),
        );
        let cache = FetchCache::new(
            parts.store,
            Arc::clone(&registry),
            parts.http,
            parts.extractor,
        );

        Self {
            config,
            registry,
            artifacts,
            cache,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn create_repository(
        &self,
        format: Format,
        request: CreateRepository,
    ) -> Result<Repository> {
        self.registry.create(format, request).await
    }

    pub async fn get_repository(&self, format: Format, name: &str) -> Result<Repository> {
        self.registry.get(format, name).await
    }

    pub async fn list_repositories(&self, format: Format) -> Result<Vec<Repository>> {
        self.registry.list(format).await
    }

    pub async fn delete_repository(&self, format: Format, name: &str) -> Result<()> {
        self.registry.delete(format, name).await
    }

    pub async fn sync_repository(&self, format: Format, name: &str) -> Result<Repository> {
        self.registry.sync(format, name).await
    }

    pub async fn git_info(&self, name: &str) -> Result<GitRepositoryInfo> {
        self.registry.git_info(name).await
    }

    pub async fn create_branch(&self, repo: &str, branch: &str, base: Option<&str>) -> Result<()> {
        self.registry.create_branch(repo, branch, base).await
    }

    pub async fn delete_branch(&self, repo: &str, branch: &str) -> Result<()> {
        self.registry.delete_branch(repo, branch).await
    }

    pub async fn add_group_member(
        &self,
        format: Format,
        group: &str,
        member: &str,
        priority: i32,
    ) -> Result<Vec<GroupMember>> {
        self.registry
            .add_group_member(format, group, member, priority)
            .await
    }

    pub async fn group_members(&self, format: Format, group: &str) -> Result<Vec<GroupMember>> {
        self.registry.group_members(format, group).await
    }

    pub async fn resolve_group(&self, format: Format, group: &str) -> Result<Repository> {
        self.registry.resolve_group(format, group).await
    }

    pub async fn store_artifact<R>(
        &self,
        format: Format,
        repo: &str,
        name: &str,
        version: &str,
        payload: &mut R,
    ) -> Result<Artifact>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        self.artifacts
            .store(format, repo, name, version, payload)
            .await
    }

    pub async fn fetch_artifact(
        &self,
        format: Format,
        repo: &str,
        name: &str,
        version: &str,
    ) -> Result<PathBuf> {
        self.cache.fetch(format, repo, name, version).await
    }

    pub async fn list_artifacts(&self, format: Format, repo: &str) -> Result<Vec<Artifact>> {
        self.artifacts.list(format, repo).await
    }

    pub async fn search_artifacts(&self, format: Format, query: &str) -> Result<Vec<SearchHit>> {
        self.artifacts.search(format, query).await
    }
}
