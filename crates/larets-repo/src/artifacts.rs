//! Publishing to hosted repositories, listing and search

use chrono::Utc;
use larets_core::{Artifact, ArtifactDetails, Format, MetadataExtractor, Repository, RepositoryType};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{info, instrument, warn};

use crate::error::{RepoError, Result};
use crate::flight::KeyedLocks;
use crate::format::{adapter, validate_artifact_key};
use crate::paths::{StoragePaths, stage};
use crate::registry::RepositoryRegistry;
use crate::store::{MetadataStore, NewArtifact, SearchHit};
use crate::tools::PackagingTool;

type ArtifactKey = (i64, String, String);

/// Hosted artifact store
pub struct ArtifactStore {
    store: Arc<dyn MetadataStore>,
    registry: Arc<RepositoryRegistry>,
    paths: StoragePaths,
    packaging: Arc<dyn PackagingTool>,
    extractor: Arc<dyn MetadataExtractor>,
    base_url: String,
    locks: KeyedLocks<ArtifactKey>,
}

/// Extract details on a blocking thread; failures degrade to the fallback
pub(crate) async fn extract_details(
    extractor: &Arc<dyn MetadataExtractor>,
    format: Format,
    version: &str,
    path: &Path,
) -> ArtifactDetails {
    let extractor = Arc::clone(extractor);
    let owned_version = version.to_string();
    let owned_path = path.to_path_buf();

    let extracted = tokio::task::spawn_blocking(move || {
        extractor.extract(format, &owned_version, &owned_path)
    })
    .await;

    match extracted {
        Ok(Ok(details)) => details,
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "metadata extraction failed");
            ArtifactDetails::fallback(format, version)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "metadata extraction aborted");
            ArtifactDetails::fallback(format, version)
        }
    }
}

impl ArtifactStore {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        registry: Arc<RepositoryRegistry>,
        paths: StoragePaths,
        packaging: Arc<dyn PackagingTool>,
        extractor: Arc<dyn MetadataExtractor>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            paths,
            packaging,
            extractor,
            base_url: base_url.into(),
            locks: KeyedLocks::new(),
        }
    }

    /// Publish `payload` as `name:version` in a hosted repository
    ///
    /// Versions are immutable: publishing an existing version is refused
    /// before any byte is written.
    #[instrument(skip(self, payload))]
    pub async fn store<R>(
        &self,
        format: Format,
        repo_name: &str,
        name: &str,
        version: &str,
        payload: &mut R,
    ) -> Result<Artifact>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let repo = self.registry.resolve(format, repo_name).await?;
        if !repo.is_hosted() {
            return Err(RepoError::wrong_type(
                &repo.name,
                RepositoryType::Hosted,
                repo.repo_type,
            ));
        }
        if format == Format::Git {
            return Err(RepoError::not_implemented(
                "publish to a git repository (push with git instead)",
            ));
        }
        validate_artifact_key(format, name, version)?;

        let key = (repo.id, name.to_string(), version.to_string());
        let _guard = self.locks.lock(&key).await;

        if self.store.find_artifact(repo.id, name, version).await?.is_some() {
            return Err(RepoError::ArtifactExists {
                repo: repo.name.clone(),
                name: name.to_string(),
                version: version.to_string(),
            });
        }

        let target = adapter(format).artifact_path(&repo, name, version);
        let mut staged = stage(&target).await?;
        staged.copy_from(payload).await?;
        let written = staged.commit().await?;

        let details = extract_details(&self.extractor, format, version, &written.path).await;

        let new = NewArtifact {
            repository_id: repo.id,
            format,
            name: name.to_string(),
            version: version.to_string(),
            path: written.path.clone(),
            size: written.size,
            sha256: Some(written.sha256.clone()),
            details,
            created_at: Utc::now(),
        };

        let artifact = match self.store.insert_artifact(new).await {
            Ok(artifact) => artifact,
            // Lost a race with another process; the file belongs to its row now
            Err(RepoError::ArtifactExists { .. }) => {
                return Err(RepoError::ArtifactExists {
                    repo: repo.name.clone(),
                    name: name.to_string(),
                    version: version.to_string(),
                });
            }
            Err(e) => {
                warn!(path = %written.path.display(), error = %e, "insert failed, removing stored file");
                self.discard_file(&written.path).await;
                return Err(e);
            }
        };

        if format == Format::Helm {
            if let Err(e) = self.reindex(&repo).await {
                warn!(repository = %repo.name, error = %e, "index update failed, rolling back publish");
                if let Err(cleanup) = self.store.delete_artifact(artifact.id).await {
                    warn!(error = %cleanup, "failed to remove artifact record during rollback");
                }
                self.discard_file(&written.path).await;
                if let Err(rebuild) = self.reindex(&repo).await {
                    warn!(repository = %repo.name, error = %rebuild, "index rebuild after rollback failed");
                }
                return Err(e);
            }
        }

        info!(
            format = %format,
            repository = %repo.name,
            artifact = %name,
            version = %version,
            size = artifact.size,
            "published artifact"
        );
        Ok(artifact)
    }

    async fn discard_file(&self, path: &Path) {
        if let Err(e) = self.paths.remove_file(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove file during rollback");
        }
    }

    /// Regenerate a hosted Helm repository's index
    async fn reindex(&self, repo: &Repository) -> Result<()> {
        let index_file = repo.index_file().ok_or_else(|| RepoError::Internal {
            message: format!("repository {} has no chart index", repo.name),
        })?;
        let download_base = format!(
            "{}/helm/{}/charts",
            self.base_url.trim_end_matches('/'),
            repo.name
        );

        self.packaging
            .build_index(&repo.storage_path.join("charts"), &download_base, &index_file)
            .await?;
        Ok(())
    }

    /// Artifacts of a repository, by name then age
    pub async fn list(&self, format: Format, repo_name: &str) -> Result<Vec<Artifact>> {
        let repo = self.registry.resolve(format, repo_name).await?;
        self.store.list_artifacts(repo.id).await
    }

    /// Substring search across all repositories of a format
    ///
    /// `query` is `name` or `name:version`.
    pub async fn search(&self, format: Format, query: &str) -> Result<Vec<SearchHit>> {
        self.registry.ensure_enabled(format)?;

        let (name, version) = match query.trim().split_once(':') {
            Some((name, version)) => (name, Some(version).filter(|v| !v.is_empty())),
            None => (query.trim(), None),
        };
        if name.is_empty() {
            return Err(RepoError::invalid("search query needs an artifact name"));
        }

        self.store.search_artifacts(format, name, version).await
    }
}
