//! On-disk layout of repositories and artifacts
//!
//! Every repository owns `<root>/<format>/<name>/`. Files are written to a
//! temporary sibling and renamed into place, so readers never observe a
//! partially written artifact. A staged file that is dropped before
//! [`StagedFile::commit`] removes itself.

use larets_core::Format;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::{RepoError, Result};

const COPY_BUFFER: usize = 64 * 1024;

/// Storage path manager
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    /// Relative roots are resolved against the current directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<format>/<name>`
    pub fn repository_root(&self, format: Format, name: &str) -> PathBuf {
        self.root.join(format.as_str()).join(name)
    }

    /// Create a repository root
    ///
    /// An existing empty directory is reused. A non-empty one belongs to
    /// nobody the metadata store knows about and is refused.
    pub async fn allocate(&self, format: Format, name: &str) -> Result<PathBuf> {
        let path = self.repository_root(format, name);

        match tokio::fs::read_dir(&path).await {
            Ok(mut entries) => {
                let occupied = entries
                    .next_entry()
                    .await
                    .map_err(|e| RepoError::storage(&path, e))?
                    .is_some();
                if occupied {
                    return Err(RepoError::storage(
                        &path,
                        "directory already exists and is not empty",
                    ));
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(RepoError::storage(&path, e)),
        }

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| RepoError::storage(&path, e))?;
        Ok(path)
    }

    /// Remove a directory tree. Missing paths are not an error.
    pub async fn remove_dir(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RepoError::storage(path, e)),
        }
    }

    /// Remove a single file. Missing files are not an error.
    pub async fn remove_file(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RepoError::storage(path, e)),
        }
    }
}

/// Open a temporary file next to `target`, creating parent directories
pub async fn stage(target: &Path) -> Result<StagedFile> {
    let parent = target
        .parent()
        .ok_or_else(|| RepoError::storage(target, "path has no parent directory"))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| RepoError::storage(parent, e))?;

    let named = tempfile::Builder::new()
        .prefix(".larets-")
        .suffix(".partial")
        .tempfile_in(parent)
        .map_err(|e| RepoError::storage(parent, e))?;
    let (file, temp) = named.into_parts();

    Ok(StagedFile {
        file: tokio::fs::File::from_std(file),
        temp,
        target: target.to_path_buf(),
        hasher: Sha256::new(),
        size: 0,
    })
}

/// Write `content` to `target` atomically
pub async fn write_atomic(target: &Path, content: &[u8]) -> Result<WrittenFile> {
    let mut staged = stage(target).await?;
    staged.write(content).await?;
    staged.commit().await
}

/// A file being written, not yet visible at its target path
pub struct StagedFile {
    file: tokio::fs::File,
    temp: TempPath,
    target: PathBuf,
    hasher: Sha256,
    size: u64,
}

/// A committed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub size: u64,
    /// Hex-encoded SHA-256 of the content
    pub sha256: String,
}

impl StagedFile {
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| RepoError::storage(&self.target, e))?;
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
        Ok(())
    }

    /// Copy a reader to the end of the file
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; COPY_BUFFER];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| RepoError::storage(&self.target, format!("reading payload: {}", e)))?;
            if n == 0 {
                return Ok(());
            }
            self.write(&buf[..n]).await?;
        }
    }

    /// Flush and rename into place
    pub async fn commit(mut self) -> Result<WrittenFile> {
        self.file
            .flush()
            .await
            .map_err(|e| RepoError::storage(&self.target, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| RepoError::storage(&self.target, e))?;
        drop(self.file);

        self.temp
            .persist(&self.target)
            .map_err(|e| RepoError::storage(&self.target, e.error))?;

        Ok(WrittenFile {
            path: self.target,
            size: self.size,
            sha256: hex::encode(self.hasher.finalize()),
        })
    }
}
