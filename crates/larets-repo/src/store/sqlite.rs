//! SQLite-backed metadata store
//!
//! Features:
//! - WAL mode for concurrent readers
//! - Uniqueness constraints as the cross-process source of truth
//! - Blocking calls run on tokio's blocking pool

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use larets_core::{Artifact, Format, GroupMember, Repository};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{MetadataStore, NewArtifact, NewRepository, SearchHit};
use crate::error::{RepoError, Result};

const REPOSITORY_COLUMNS: &str = "id, format, name, description, repo_type, url, cache_enabled, \
     cache_ttl_ms, storage_path, options, created_at, updated_at";

const ARTIFACT_COLUMNS: &str = "a.id, a.repository_id, a.format, a.name, a.version, a.path, \
     a.size, a.sha256, a.created_at, a.updated_at, a.download_count, a.details";

/// SQLite metadata store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RepoError::storage(parent, e))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| RepoError::persistence("open database", e))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init(true)?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| RepoError::persistence("open database", e))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init(false)?;
        Ok(store)
    }

    fn init(&self, wal: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let err = |e: rusqlite::Error| RepoError::persistence("initialize schema", e);

        if wal {
            conn.pragma_update(None, "journal_mode", "WAL").map_err(err)?;
            conn.pragma_update(None, "synchronous", "NORMAL").map_err(err)?;
        }
        conn.pragma_update(None, "foreign_keys", "ON").map_err(err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(err)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS repositories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                format TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                repo_type TEXT NOT NULL,
                url TEXT NOT NULL DEFAULT '',
                cache_enabled INTEGER NOT NULL DEFAULT 1,
                cache_ttl_ms INTEGER NOT NULL,
                storage_path TEXT NOT NULL,
                options TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(format, name)
            );

            CREATE TABLE IF NOT EXISTS artifacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repository_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
                format TEXT NOT NULL,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                path TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                sha256 TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                download_count INTEGER NOT NULL DEFAULT 0,
                details TEXT NOT NULL,
                UNIQUE(repository_id, name, version)
            );

            CREATE TABLE IF NOT EXISTS group_members (
                group_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
                member_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
                priority INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (group_id, member_id)
            );

            CREATE INDEX IF NOT EXISTS idx_artifacts_repo ON artifacts(repository_id);
            CREATE INDEX IF NOT EXISTS idx_artifacts_name ON artifacts(name);
            "#,
        )
        .map_err(err)?;

        Ok(())
    }

    /// Run `f` against the connection on the blocking pool
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        })
        .await?
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {}", micros).into(),
        )
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        format: parse_column(row, 1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        repo_type: parse_column(row, 4)?,
        url: row.get(5)?,
        cache_enabled: row.get::<_, i32>(6)? != 0,
        cache_ttl: Duration::from_millis(row.get::<_, i64>(7)?.max(0) as u64),
        storage_path: PathBuf::from(row.get::<_, String>(8)?),
        options: json_column(row, 9)?,
        created_at: timestamp_column(row, 10)?,
        updated_at: timestamp_column(row, 11)?,
    })
}

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<Artifact> {
    Ok(Artifact {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        format: parse_column(row, 2)?,
        name: row.get(3)?,
        version: row.get(4)?,
        path: PathBuf::from(row.get::<_, String>(5)?),
        size: row.get::<_, i64>(6)?.max(0) as u64,
        sha256: row.get(7)?,
        created_at: timestamp_column(row, 8)?,
        updated_at: timestamp_column(row, 9)?,
        download_count: row.get::<_, i64>(10)?.max(0) as u64,
        details: json_column(row, 11)?,
    })
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn insert_repository(&self, repo: NewRepository) -> Result<Repository> {
        let options = serde_json::to_string(&repo.options)?;
        self.call(move |conn| {
            let created = to_micros(repo.created_at);
            let inserted = conn.execute(
                r#"
                INSERT INTO repositories (format, name, description, repo_type, url,
                    cache_enabled, cache_ttl_ms, storage_path, options, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                "#,
                params![
                    repo.format.as_str(),
                    repo.name,
                    repo.description,
                    repo.repo_type.as_str(),
                    repo.url,
                    repo.cache_enabled as i32,
                    repo.cache_ttl.as_millis() as i64,
                    repo.storage_path.to_string_lossy(),
                    options,
                    created,
                ],
            );

            match inserted {
                Ok(_) => Ok(repo.into_repository(conn.last_insert_rowid())),
                Err(e) if is_constraint_violation(&e) => Err(RepoError::DuplicateName {
                    format: repo.format,
                    name: repo.name,
                }),
                Err(e) => Err(RepoError::persistence("insert repository", e)),
            }
        })
        .await
    }

    async fn delete_repository(&self, id: i64) -> Result<()> {
        self.call(move |conn| {
            conn.execute("DELETE FROM repositories WHERE id = ?1", [id])
                .map_err(|e| RepoError::persistence("delete repository", e))?;
            Ok(())
        })
        .await
    }

    async fn find_repository(&self, format: Format, name: &str) -> Result<Option<Repository>> {
        let name = name.to_string();
        self.call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM repositories WHERE format = ?1 AND name = ?2",
                    REPOSITORY_COLUMNS
                ),
                params![format.as_str(), name],
                repository_from_row,
            )
            .optional()
            .map_err(|e| RepoError::persistence("find repository", e))
        })
        .await
    }

    async fn list_repositories(&self, format: Format) -> Result<Vec<Repository>> {
        self.call(move |conn| {
            let err = |e: rusqlite::Error| RepoError::persistence("list repositories", e);
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM repositories WHERE format = ?1 ORDER BY name",
                    REPOSITORY_COLUMNS
                ))
                .map_err(err)?;
            let repos = stmt
                .query_map([format.as_str()], repository_from_row)
                .map_err(err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(err)?;
            Ok(repos)
        })
        .await
    }

    async fn touch_repository(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "UPDATE repositories SET updated_at = ?1 WHERE id = ?2",
                params![to_micros(at), id],
            )
            .map_err(|e| RepoError::persistence("touch repository", e))?;
            Ok(())
        })
        .await
    }

    async fn find_artifact(
        &self,
        repository_id: i64,
        name: &str,
        version: &str,
    ) -> Result<Option<Artifact>> {
        let name = name.to_string();
        let version = version.to_string();
        self.call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM artifacts a \
                     WHERE a.repository_id = ?1 AND a.name = ?2 AND a.version = ?3",
                    ARTIFACT_COLUMNS
                ),
                params![repository_id, name, version],
                artifact_from_row,
            )
            .optional()
            .map_err(|e| RepoError::persistence("find artifact", e))
        })
        .await
    }

    async fn insert_artifact(&self, artifact: NewArtifact) -> Result<Artifact> {
        let details = serde_json::to_string(&artifact.details)?;
        self.call(move |conn| {
            let created = to_micros(artifact.created_at);
            let inserted = conn.execute(
                r#"
                INSERT INTO artifacts (repository_id, format, name, version, path, size,
                    sha256, created_at, updated_at, download_count, details)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 0, ?9)
                "#,
                params![
                    artifact.repository_id,
                    artifact.format.as_str(),
                    artifact.name,
                    artifact.version,
                    artifact.path.to_string_lossy(),
                    artifact.size as i64,
                    artifact.sha256,
                    created,
                    details,
                ],
            );

            match inserted {
                Ok(_) => Ok(artifact.into_artifact(conn.last_insert_rowid())),
                Err(e) if is_constraint_violation(&e) => Err(RepoError::ArtifactExists {
                    repo: format!("#{}", artifact.repository_id),
                    name: artifact.name,
                    version: artifact.version,
                }),
                Err(e) => Err(RepoError::persistence("insert artifact", e)),
            }
        })
        .await
    }

    async fn touch_artifact(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "UPDATE artifacts SET updated_at = ?1 WHERE id = ?2",
                params![to_micros(at), id],
            )
            .map_err(|e| RepoError::persistence("touch artifact", e))?;
            Ok(())
        })
        .await
    }

    async fn delete_artifact(&self, id: i64) -> Result<()> {
        self.call(move |conn| {
            conn.execute("DELETE FROM artifacts WHERE id = ?1", [id])
                .map_err(|e| RepoError::persistence("delete artifact", e))?;
            Ok(())
        })
        .await
    }

    async fn list_artifacts(&self, repository_id: i64) -> Result<Vec<Artifact>> {
        self.call(move |conn| {
            let err = |e: rusqlite::Error| RepoError::persistence("list artifacts", e);
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM artifacts a WHERE a.repository_id = ?1 \
                     ORDER BY a.name, a.created_at, a.id",
                    ARTIFACT_COLUMNS
                ))
                .map_err(err)?;
            let artifacts = stmt
                .query_map([repository_id], artifact_from_row)
                .map_err(err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(err)?;
            Ok(artifacts)
        })
        .await
    }

    async fn search_artifacts(
        &self,
        format: Format,
        name: &str,
        version: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let name_pattern = like_pattern(name);
        let version_pattern = like_pattern(version.unwrap_or(""));
        self.call(move |conn| {
            let err = |e: rusqlite::Error| RepoError::persistence("search artifacts", e);
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {}, r.name FROM artifacts a \
                     JOIN repositories r ON r.id = a.repository_id \
                     WHERE r.format = ?1 \
                       AND a.name LIKE ?2 ESCAPE '\\' \
                       AND a.version LIKE ?3 ESCAPE '\\' \
                     ORDER BY r.name, a.name, a.version",
                    ARTIFACT_COLUMNS
                ))
                .map_err(err)?;
            let hits = stmt
                .query_map(
                    params![format.as_str(), name_pattern, version_pattern],
                    |row| {
                        Ok(SearchHit {
                            artifact: artifact_from_row(row)?,
                            repository: row.get(12)?,
                        })
                    },
                )
                .map_err(err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(err)?;
            Ok(hits)
        })
        .await
    }

    async fn add_group_member(&self, group_id: i64, member_id: i64, priority: i32) -> Result<()> {
        self.call(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO group_members (group_id, member_id, priority) VALUES (?1, ?2, ?3)",
                params![group_id, member_id, priority],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(e) if is_constraint_violation(&e) => Err(RepoError::invalid(format!(
                    "repository #{} is already a member of group #{}",
                    member_id, group_id
                ))),
                Err(e) => Err(RepoError::persistence("add group member", e)),
            }
        })
        .await
    }

    async fn group_members(&self, group_id: i64) -> Result<Vec<GroupMember>> {
        self.call(move |conn| {
            let err = |e: rusqlite::Error| RepoError::persistence("list group members", e);
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT g.group_id, g.member_id, r.name, r.repo_type, g.priority
                    FROM group_members g
                    JOIN repositories r ON r.id = g.member_id
                    WHERE g.group_id = ?1
                    ORDER BY g.priority, r.name
                    "#,
                )
                .map_err(err)?;
            let members = stmt
                .query_map([group_id], |row| {
                    Ok(GroupMember {
                        group_id: row.get(0)?,
                        member_id: row.get(1)?,
                        member_name: row.get(2)?,
                        member_type: parse_column(row, 3)?,
                        priority: row.get(4)?,
                    })
                })
                .map_err(err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(err)?;
            Ok(members)
        })
        .await
    }
}

/// `%value%` with LIKE wildcards in `value` escaped
fn like_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_repository_uniqueness() {
        let store = SqliteStore::open_memory().unwrap();
        conformance::repository_uniqueness(&store).await;
    }

    #[tokio::test]
    async fn test_artifact_lifecycle() {
        let store = SqliteStore::open_memory().unwrap();
        conformance::artifact_lifecycle(&store).await;
    }

    #[tokio::test]
    async fn test_group_membership() {
        let store = SqliteStore::open_memory().unwrap();
        conformance::group_membership(&store).await;
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("meta/larets.db");

        {
            let store = SqliteStore::open(&db).unwrap();
            store
                .insert_repository(conformance::new_repo(
                    Format::Git,
                    "mirror",
                    larets_core::RepositoryType::Proxy,
                ))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&db).unwrap();
        let repo = store.get_repository(Format::Git, "mirror").await.unwrap();
        assert_eq!(repo.branch(), Some("master"));
        assert_eq!(repo.cache_ttl, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_corrupt_timestamp_is_an_error() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("larets.db");

        {
            let store = SqliteStore::open(&db).unwrap();
            store
                .insert_repository(conformance::new_repo(
                    Format::Helm,
                    "charts",
                    larets_core::RepositoryType::Hosted,
                ))
                .await
                .unwrap();
        }
        Connection::open(&db)
            .unwrap()
            .execute("UPDATE repositories SET updated_at = ?1", [i64::MAX])
            .unwrap();

        let store = SqliteStore::open(&db).unwrap();
        let err = store.find_repository(Format::Helm, "charts").await.unwrap_err();
        assert!(matches!(err, RepoError::Persistence { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_delete_repository_cascades() {
        let store = SqliteStore::open_memory().unwrap();
        let repo = store
            .insert_repository(conformance::new_repo(
                Format::Helm,
                "charts",
                larets_core::RepositoryType::Hosted,
            ))
            .await
            .unwrap();
        store
            .insert_artifact(conformance::new_artifact(repo.id, "app", "1.0.0"))
            .await
            .unwrap();

        store.delete_repository(repo.id).await.unwrap();
        assert!(store.list_artifacts(repo.id).await.unwrap().is_empty());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a_b%"), "%a\\_b\\%%");
        assert_eq!(like_pattern(""), "%%");
    }
}
