//! In-memory metadata store for testing
//!
//! Records live in a map behind an `RwLock`. Operation counts and one-shot
//! failure switches let tests observe and break the engine's interaction
//! with the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use larets_core::{Artifact, Format, GroupMember, Repository};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::{MetadataStore, NewArtifact, NewRepository, SearchHit, stored_precision};
use crate::error::{RepoError, Result};

/// In-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    operations: Arc<RwLock<OperationCounts>>,
    faults: Arc<Faults>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    repositories: BTreeMap<i64, Repository>,
    artifacts: BTreeMap<i64, Artifact>,
    /// (group_id, member_id) -> priority
    members: BTreeMap<(i64, i64), i32>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
struct Faults {
    repository_insert: AtomicBool,
    artifact_insert: AtomicBool,
    artifact_touch: AtomicBool,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub repository_inserts: usize,
    pub repository_deletes: usize,
    pub repository_lookups: usize,
    pub artifact_inserts: usize,
    pub artifact_touches: usize,
    pub artifact_deletes: usize,
    pub artifact_lookups: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self.operations.write().unwrap_or_else(PoisonError::into_inner) =
            OperationCounts::default();
    }

    /// Make the next repository insert fail with a persistence error
    pub fn fail_next_repository_insert(&self) {
        self.faults.repository_insert.store(true, Ordering::SeqCst);
    }

    /// Make the next artifact insert fail with a persistence error
    pub fn fail_next_artifact_insert(&self) {
        self.faults.artifact_insert.store(true, Ordering::SeqCst);
    }

    /// Make the next artifact touch fail with a persistence error
    pub fn fail_next_artifact_touch(&self) {
        self.faults.artifact_touch.store(true, Ordering::SeqCst);
    }

    /// Total artifact rows (for testing)
    pub fn artifact_count(&self) -> usize {
        self.read().artifacts.len()
    }

    /// Total repository rows (for testing)
    pub fn repository_count(&self) -> usize {
        self.read().repositories.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self.operations.write().unwrap_or_else(PoisonError::into_inner));
    }

    fn injected(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.swap(false, Ordering::SeqCst) {
            return Err(RepoError::persistence(operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn insert_repository(&self, repo: NewRepository) -> Result<Repository> {
        self.count(|ops| ops.repository_inserts += 1);
        Self::injected(&self.faults.repository_insert, "insert repository")?;

        let mut state = self.write();
        let taken = state
            .repositories
            .values()
            .any(|r| r.format == repo.format && r.name == repo.name);
        if taken {
            return Err(RepoError::DuplicateName {
                format: repo.format,
                name: repo.name,
            });
        }

        let id = state.allocate_id();
        let repository = repo.into_repository(id);
        state.repositories.insert(id, repository.clone());
        Ok(repository)
    }

    async fn delete_repository(&self, id: i64) -> Result<()> {
        self.count(|ops| ops.repository_deletes += 1);

        let mut state = self.write();
        state.repositories.remove(&id);
        state.artifacts.retain(|_, a| a.repository_id != id);
        state
            .members
            .retain(|(group, member), _| *group != id && *member != id);
        Ok(())
    }

    async fn find_repository(&self, format: Format, name: &str) -> Result<Option<Repository>> {
        self.count(|ops| ops.repository_lookups += 1);

        Ok(self
            .read()
            .repositories
            .values()
            .find(|r| r.format == format && r.name == name)
            .cloned())
    }

    async fn list_repositories(&self, format: Format) -> Result<Vec<Repository>> {
        let mut repos: Vec<_> = self
            .read()
            .repositories
            .values()
            .filter(|r| r.format == format)
            .cloned()
            .collect();
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repos)
    }

    async fn touch_repository(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(repo) = self.write().repositories.get_mut(&id) {
            repo.updated_at = stored_precision(at);
        }
        Ok(())
    }

    async fn find_artifact(
        &self,
        repository_id: i64,
        name: &str,
        version: &str,
    ) -> Result<Option<Artifact>> {
        self.count(|ops| ops.artifact_lookups += 1);

        Ok(self
            .read()
            .artifacts
            .values()
            .find(|a| a.repository_id == repository_id && a.name == name && a.version == version)
            .cloned())
    }

    async fn insert_artifact(&self, artifact: NewArtifact) -> Result<Artifact> {
        self.count(|ops| ops.artifact_inserts += 1);
        Self::injected(&self.faults.artifact_insert, "insert artifact")?;

        let mut state = self.write();
        let taken = state.artifacts.values().any(|a| {
            a.repository_id == artifact.repository_id
                && a.name == artifact.name
                && a.version == artifact.version
        });
        if taken {
            return Err(RepoError::ArtifactExists {
                repo: format!("#{}", artifact.repository_id),
                name: artifact.name,
                version: artifact.version,
            });
        }

        let id = state.allocate_id();
        let artifact = artifact.into_artifact(id);
        state.artifacts.insert(id, artifact.clone());
        Ok(artifact)
    }

    async fn touch_artifact(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.count(|ops| ops.artifact_touches += 1);
        Self::injected(&self.faults.artifact_touch, "touch artifact")?;

        if let Some(artifact) = self.write().artifacts.get_mut(&id) {
            artifact.updated_at = stored_precision(at);
        }
        Ok(())
    }

    async fn delete_artifact(&self, id: i64) -> Result<()> {
        self.count(|ops| ops.artifact_deletes += 1);
        self.write().artifacts.remove(&id);
        Ok(())
    }

    async fn list_artifacts(&self, repository_id: i64) -> Result<Vec<Artifact>> {
        let mut artifacts: Vec<_> = self
            .read()
            .artifacts
            .values()
            .filter(|a| a.repository_id == repository_id)
            .cloned()
            .collect();
        artifacts.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(artifacts)
    }

    async fn search_artifacts(
        &self,
        format: Format,
        name: &str,
        version: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let state = self.read();
        let mut hits: Vec<_> = state
            .artifacts
            .values()
            .filter(|a| a.name.contains(name))
            .filter(|a| version.map(|v| a.version.contains(v)).unwrap_or(true))
            .filter_map(|a| {
                let repo = state.repositories.get(&a.repository_id)?;
                (repo.format == format).then(|| SearchHit {
                    repository: repo.name.clone(),
                    artifact: a.clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            (&a.repository, &a.artifact.name, &a.artifact.version).cmp(&(
                &b.repository,
                &b.artifact.name,
                &b.artifact.version,
            ))
        });
        Ok(hits)
    }

    async fn add_group_member(&self, group_id: i64, member_id: i64, priority: i32) -> Result<()> {
        let mut state = self.write();
        if state.members.contains_key(&(group_id, member_id)) {
            return Err(RepoError::invalid(format!(
                "repository #{} is already a member of group #{}",
                member_id, group_id
            )));
        }
        state.members.insert((group_id, member_id), priority);
        Ok(())
    }

    async fn group_members(&self, group_id: i64) -> Result<Vec<GroupMember>> {
        let state = self.read();
        let mut members: Vec<_> = state
            .members
            .iter()
            .filter(|((group, _), _)| *group == group_id)
            .filter_map(|((group, member), priority)| {
                let repo = state.repositories.get(member)?;
                Some(GroupMember {
                    group_id: *group,
                    member_id: *member,
                    member_name: repo.name.clone(),
                    member_type: repo.repo_type,
                    priority: *priority,
                })
            })
            .collect();
        GroupMember::resolution_order(&mut members);
        Ok(members)
    }
}
