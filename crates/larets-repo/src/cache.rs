//! Fetch-through cache for proxy repositories
//!
//! A cached file is fresh while its modification time is younger than the
//! repository's cache TTL; fresh hits never touch the origin or the metadata
//! store. Misses are fetched at most once at a time per artifact key, and
//! concurrent callers share the result.

use chrono::Utc;
use larets_core::{ArtifactDetails, Format, MetadataExtractor, Repository, RepositoryType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::artifacts::extract_details;
use crate::error::{RepoError, Result};
use crate::flight::SingleFlight;
use crate::format::{adapter, validate_artifact_key};
use crate::paths::WrittenFile;
use crate::registry::RepositoryRegistry;
use crate::remote::HttpOrigin;
use crate::store::{MetadataStore, NewArtifact, stored_precision};

type ArtifactKey = (i64, String, String);

/// Whether the file at `path` may be served without asking the origin
pub async fn is_fresh(repo: &Repository, path: &Path) -> bool {
    if !repo.cache_enabled {
        return false;
    }
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    match metadata.modified().map(|mtime| mtime.elapsed()) {
        Ok(Ok(age)) => age < repo.cache_ttl,
        // Modified in the future
        Ok(Err(_)) => true,
        Err(_) => false,
    }
}

/// What a fetch needs from the engine, owned so it can outlive the caller
#[derive(Clone)]
struct Filler {
    store: Arc<dyn MetadataStore>,
    http: HttpOrigin,
    extractor: Arc<dyn MetadataExtractor>,
}

impl Filler {
    async fn fill(
        self,
        repo: Repository,
        name: String,
        version: String,
        path: PathBuf,
    ) -> Result<PathBuf> {
        // A previous leader may have just refreshed it
        if is_fresh(&repo, &path).await {
            debug!(path = %path.display(), "filled while waiting");
            return Ok(path);
        }

        let format_adapter = adapter(repo.format);
        let url = format_adapter
            .remote_url(&repo, &name, &version)
            .ok_or_else(|| RepoError::not_implemented(format!("fetch from {} origin", repo.format)))?;

        // A refreshed file stays with its row; a new file goes if its insert fails
        let existing = self.store.find_artifact(repo.id, &name, &version).await?;

        let written = self
            .http
            .download(&url, format_adapter.accept(), &path)
            .await?;

        match existing {
            Some(existing) => {
                let now = stored_precision(Utc::now());
                let at = if now > existing.updated_at {
                    now
                } else {
                    existing.updated_at + chrono::Duration::microseconds(1)
                };
                if let Err(e) = self.store.touch_artifact(existing.id, at).await {
                    warn!(path = %path.display(), error = %e, "refreshed file kept, updatedAt not recorded");
                    return Err(e);
                }
            }
            None => {
                let details =
                    extract_details(&self.extractor, repo.format, &version, &written.path).await;
                if let Err(e) = self.insert(&repo, &name, &version, &written, details).await {
                    warn!(path = %path.display(), error = %e, "metadata insert failed, dropping cached file");
                    if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                        warn!(path = %path.display(), error = %cleanup, "failed to remove cached file");
                    }
                    return Err(e);
                }
            }
        }

        info!(
            format = %repo.format,
            repository = %repo.name,
            artifact = %name,
            version = %version,
            size = written.size,
            "fetched from origin"
        );
        Ok(path)
    }

    async fn insert(
        &self,
        repo: &Repository,
        name: &str,
        version: &str,
        written: &WrittenFile,
        details: ArtifactDetails,
    ) -> Result<()> {
        let new = NewArtifact {
            repository_id: repo.id,
            format: repo.format,
            name: name.to_string(),
            version: version.to_string(),
            path: written.path.clone(),
            size: written.size,
            sha256: Some(written.sha256.clone()),
            details,
            created_at: stored_precision(Utc::now()),
        };
        match self.store.insert_artifact(new).await {
            Ok(_) => Ok(()),
            // Inserted by another process in the meantime
            Err(RepoError::ArtifactExists { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Fetch-through cache
pub struct FetchCache {
    registry: Arc<RepositoryRegistry>,
    filler: Filler,
    flight: SingleFlight<ArtifactKey, PathBuf>,
}

impl FetchCache {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        registry: Arc<RepositoryRegistry>,
        http: HttpOrigin,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self {
            registry,
            filler: Filler {
                store,
                http,
                extractor,
            },
            flight: SingleFlight::new(),
        }
    }

    /// Local path of `name:version`, fetched from the origin when stale
    #[instrument(skip(self))]
    pub async fn fetch(
        &self,
        format: Format,
        repo_name: &str,
        name: &str,
        version: &str,
    ) -> Result<PathBuf> {
        let repo = self.registry.resolve(format, repo_name).await?;
        if !repo.is_proxy() {
            return Err(RepoError::wrong_type(
                &repo.name,
                RepositoryType::Proxy,
                repo.repo_type,
            ));
        }
        if format == Format::Git {
            return Err(RepoError::not_implemented(
                "fetch from a git proxy (clone the mirror instead)",
            ));
        }
        validate_artifact_key(format, name, version)?;

        let path = adapter(format).artifact_path(&repo, name, version);
        if is_fresh(&repo, &path).await {
            debug!(path = %path.display(), "cache hit");
            return Ok(path);
        }

        let key = (repo.id, name.to_string(), version.to_string());
        let work = self
            .filler
            .clone()
            .fill(repo, name.to_string(), version.to_string(), path);
        self.flight.run(key, work).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larets_core::FormatOptions;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn proxy(root: &Path, cache_enabled: bool, ttl: Duration) -> Repository {
        Repository {
            id: 1,
            format: Format::Helm,
            name: "proxy".to_string(),
            description: String::new(),
            repo_type: RepositoryType::Proxy,
            url: "https://charts.example.com".to_string(),
            cache_enabled,
            cache_ttl: ttl,
            storage_path: root.to_path_buf(),
            options: FormatOptions::defaults(Format::Helm, RepositoryType::Proxy),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_freshness_follows_mtime() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("chart.tgz");
        std::fs::write(&file, "x").unwrap();
        let repo = proxy(temp.path(), true, Duration::from_secs(60));

        assert!(is_fresh(&repo, &file).await);

        let old = SystemTime::now() - Duration::from_secs(120);
        std::fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(old)
            .unwrap();
        assert!(!is_fresh(&repo, &file).await);
    }

    #[tokio::test]
    async fn test_disabled_cache_is_never_fresh() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("chart.tgz");
        std::fs::write(&file, "x").unwrap();

        let repo = proxy(temp.path(), false, Duration::from_secs(3600));
        assert!(!is_fresh(&repo, &file).await);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_fresh() {
        let temp = TempDir::new().unwrap();
        let repo = proxy(temp.path(), true, Duration::from_secs(3600));
        assert!(!is_fresh(&repo, &temp.path().join("absent.tgz")).await);
        assert!(!is_fresh(&repo, temp.path()).await);
    }
}
