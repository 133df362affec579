//! Metadata store for repository, artifact and group records
//!
//! The engine only talks to [`MetadataStore`]:
//! - **SQLite** ([`SqliteStore`]): the persistent store
//! - **Memory** ([`MemoryStore`]): for tests, with operation counts and fault injection
//!
//! Uniqueness of `(format, name)` for repositories and of
//! `(repository_id, name, version)` for artifacts is enforced by the store
//! itself, so it holds across processes sharing one database.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, OperationCounts};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use larets_core::{
    Artifact, ArtifactDetails, Format, FormatOptions, GroupMember, Repository, RepositoryType,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RepoError, Result};

/// A repository record before the store assigns its id
#[derive(Debug, Clone)]
pub struct NewRepository {
    pub format: Format,
    pub name: String,
    pub description: String,
    pub repo_type: RepositoryType,
    pub url: String,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub storage_path: PathBuf,
    pub options: FormatOptions,
    pub created_at: DateTime<Utc>,
}

/// Truncate to the microsecond precision timestamps are stored with
pub(crate) fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(at.timestamp_micros()).unwrap_or(at)
}

impl NewRepository {
    pub(crate) fn into_repository(self, id: i64) -> Repository {
        let created_at = stored_precision(self.created_at);
        Repository {
            id,
            format: self.format,
            name: self.name,
            description: self.description,
            repo_type: self.repo_type,
            url: self.url,
            cache_enabled: self.cache_enabled,
            cache_ttl: self.cache_ttl,
            storage_path: self.storage_path,
            options: self.options,
            created_at,
            updated_at: created_at,
        }
    }
}

/// An artifact record before the store assigns its id
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub repository_id: i64,
    pub format: Format,
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub size: u64,
    pub sha256: Option<String>,
    pub details: ArtifactDetails,
    pub created_at: DateTime<Utc>,
}

impl NewArtifact {
    pub(crate) fn into_artifact(self, id: i64) -> Artifact {
        let created_at = stored_precision(self.created_at);
        Artifact {
            id,
            repository_id: self.repository_id,
            format: self.format,
            name: self.name,
            version: self.version,
            path: self.path,
            size: self.size,
            sha256: self.sha256,
            created_at,
            updated_at: created_at,
            download_count: 0,
            details: self.details,
        }
    }
}

/// An artifact together with the name of its repository
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub repository: String,
    pub artifact: Artifact,
}

/// Persistence interface used by the engine
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a repository. A `(format, name)` collision is `DuplicateName`.
    async fn insert_repository(&self, repo: NewRepository) -> Result<Repository>;

    /// Delete a repository record with its artifacts and memberships
    async fn delete_repository(&self, id: i64) -> Result<()>;

    async fn find_repository(&self, format: Format, name: &str) -> Result<Option<Repository>>;

    /// Repositories of one format, ordered by name
    async fn list_repositories(&self, format: Format) -> Result<Vec<Repository>>;

    /// Set a repository's `updated_at`
    async fn touch_repository(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn find_artifact(
        &self,
        repository_id: i64,
        name: &str,
        version: &str,
    ) -> Result<Option<Artifact>>;

    /// Insert an artifact. A `(repository_id, name, version)` collision is
    /// `ArtifactExists`.
    async fn insert_artifact(&self, artifact: NewArtifact) -> Result<Artifact>;

    /// Set an artifact's `updated_at`, leaving everything else untouched
    async fn touch_artifact(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn delete_artifact(&self, id: i64) -> Result<()>;

    /// Artifacts of one repository, ordered by name then creation
    async fn list_artifacts(&self, repository_id: i64) -> Result<Vec<Artifact>>;

    /// Substring match on artifact name (and version, when given) across
    /// all repositories of a format
    async fn search_artifacts(
        &self,
        format: Format,
        name: &str,
        version: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    async fn add_group_member(&self, group_id: i64, member_id: i64, priority: i32) -> Result<()>;

    /// Members of a group, in resolution order
    async fn group_members(&self, group_id: i64) -> Result<Vec<GroupMember>>;

    /// Look up a repository that must exist
    async fn get_repository(&self, format: Format, name: &str) -> Result<Repository> {
        self.find_repository(format, name)
            .await?
            .ok_or_else(|| RepoError::RepositoryNotFound {
                format,
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every store must share

    use super::*;

    pub fn new_repo(format: Format, name: &str, repo_type: RepositoryType) -> NewRepository {
        NewRepository {
            format,
            name: name.to_string(),
            description: String::new(),
            repo_type,
            url: String::new(),
            cache_enabled: true,
            cache_ttl: Duration::from_secs(60),
            storage_path: PathBuf::from("/tmp").join(format.as_str()).join(name),
            options: FormatOptions::defaults(format, repo_type),
            created_at: Utc::now(),
        }
    }

    pub fn new_artifact(repository_id: i64, name: &str, version: &str) -> NewArtifact {
        NewArtifact {
            repository_id,
            format: Format::Helm,
            name: name.to_string(),
            version: version.to_string(),
            path: PathBuf::from(format!("/tmp/{}-{}.tgz", name, version)),
            size: 42,
            sha256: Some("ab".repeat(32)),
            details: ArtifactDetails::fallback(Format::Helm, version),
            created_at: Utc::now(),
        }
    }

    pub async fn repository_uniqueness(store: &dyn MetadataStore) {
        let repo = store
            .insert_repository(new_repo(Format::Helm, "charts", RepositoryType::Hosted))
            .await
            .unwrap();
        assert!(repo.id > 0);

        let err = store
            .insert_repository(new_repo(Format::Helm, "charts", RepositoryType::Proxy))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::DuplicateName { .. }));

        // Same name, other format
        store
            .insert_repository(new_repo(Format::Docker, "charts", RepositoryType::Hosted))
            .await
            .unwrap();

        let found = store.get_repository(Format::Helm, "charts").await.unwrap();
        assert_eq!(found.id, repo.id);
        assert_eq!(found.options, repo.options);
        assert_eq!(store.list_repositories(Format::Helm).await.unwrap().len(), 1);

        store.delete_repository(repo.id).await.unwrap();
        assert!(store.find_repository(Format::Helm, "charts").await.unwrap().is_none());
    }

    pub async fn artifact_lifecycle(store: &dyn MetadataStore) {
        let repo = store
            .insert_repository(new_repo(Format::Helm, "charts", RepositoryType::Proxy))
            .await
            .unwrap();

        let artifact = store
            .insert_artifact(new_artifact(repo.id, "nginx", "1.0.0"))
            .await
            .unwrap();
        assert_eq!(artifact.size, 42);
        assert_eq!(artifact.created_at, artifact.updated_at);

        let err = store
            .insert_artifact(new_artifact(repo.id, "nginx", "1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::ArtifactExists { .. }));

        let later = artifact.updated_at + chrono::Duration::seconds(5);
        store.touch_artifact(artifact.id, later).await.unwrap();
        let refreshed = store
            .find_artifact(repo.id, "nginx", "1.0.0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.updated_at, later);
        assert_eq!(refreshed.created_at, artifact.created_at);
        assert_eq!(refreshed.details, artifact.details);

        store
            .insert_artifact(new_artifact(repo.id, "redis", "17.0.0"))
            .await
            .unwrap();
        let all = store.list_artifacts(repo.id).await.unwrap();
        let names: Vec<_> = all.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["nginx", "redis"]);

        let hits = store
            .search_artifacts(Format::Helm, "gin", None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].repository, "charts");

        let hits = store
            .search_artifacts(Format::Helm, "nginx", Some("2."))
            .await
            .unwrap();
        assert!(hits.is_empty());

        store.delete_artifact(artifact.id).await.unwrap();
        assert!(store
            .find_artifact(repo.id, "nginx", "1.0.0")
            .await
            .unwrap()
            .is_none());
    }

    pub async fn group_membership(store: &dyn MetadataStore) {
        let group = store
            .insert_repository(new_repo(Format::Docker, "all", RepositoryType::Group))
            .await
            .unwrap();
        let b = store
            .insert_repository(new_repo(Format::Docker, "b-hosted", RepositoryType::Hosted))
            .await
            .unwrap();
        let a = store
            .insert_repository(new_repo(Format::Docker, "a-proxy", RepositoryType::Proxy))
            .await
            .unwrap();

        store.add_group_member(group.id, b.id, 1).await.unwrap();
        store.add_group_member(group.id, a.id, 1).await.unwrap();

        let err = store.add_group_member(group.id, a.id, 5).await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidRequest { .. }));

        let members = store.group_members(group.id).await.unwrap();
        let names: Vec<_> = members.iter().map(|m| m.member_name.as_str()).collect();
        assert_eq!(names, vec!["a-proxy", "b-hosted"]);
        assert_eq!(members[0].member_type, RepositoryType::Proxy);
    }
}
