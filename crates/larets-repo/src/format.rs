//! Per-format knowledge: remote URL shape, local layout and bootstrap
//!
//! Everything else about a repository is the same for every format.

use larets_core::{Format, Repository, RepositoryType};
use std::path::PathBuf;

use crate::error::{RepoError, Result};

/// Manifest media types accepted from a Docker registry
pub const DOCKER_MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json";

/// Content laid down when a repository is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    Nothing,
    /// Write an empty chart index
    EmptyIndex,
    /// Download `<url>/index.yaml`
    DownloadIndex,
    /// `git init --bare`
    InitBare,
    /// `git clone --mirror <url>`
    MirrorClone,
}

/// Format capability interface
pub trait FormatAdapter: Send + Sync {
    fn format(&self) -> Format;

    /// Origin URL of an artifact, `None` when the format is not fetched over HTTP
    fn remote_url(&self, repo: &Repository, name: &str, version: &str) -> Option<String>;

    /// Local file holding an artifact
    fn artifact_path(&self, repo: &Repository, name: &str, version: &str) -> PathBuf;

    /// `Accept` header for origin requests
    fn accept(&self) -> Option<&'static str> {
        None
    }

    fn bootstrap(&self, repo_type: RepositoryType) -> Bootstrap;
}

pub struct DockerAdapter;
pub struct HelmAdapter;
pub struct GitAdapter;

/// Adapter for a format
pub fn adapter(format: Format) -> &'static dyn FormatAdapter {
    match format {
        Format::Docker => &DockerAdapter,
        Format::Helm => &HelmAdapter,
        Format::Git => &GitAdapter,
    }
}

fn origin(repo: &Repository) -> &str {
    repo.url.trim_end_matches('/')
}

impl FormatAdapter for DockerAdapter {
    fn format(&self) -> Format {
        Format::Docker
    }

    fn remote_url(&self, repo: &Repository, name: &str, version: &str) -> Option<String> {
        Some(format!("{}/v2/{}/manifests/{}", origin(repo), name, version))
    }

    /// Hosted repositories keep the pushed image archive, proxies keep the
    /// registry manifest
    fn artifact_path(&self, repo: &Repository, name: &str, version: &str) -> PathBuf {
        let file = if repo.is_proxy() { "manifest.json" } else { "image.tar" };
        repo.storage_path.join(name).join(version).join(file)
    }

    fn accept(&self) -> Option<&'static str> {
        Some(DOCKER_MANIFEST_ACCEPT)
    }

    fn bootstrap(&self, _repo_type: RepositoryType) -> Bootstrap {
        Bootstrap::Nothing
    }
}

impl FormatAdapter for HelmAdapter {
    fn format(&self) -> Format {
        Format::Helm
    }

    fn remote_url(&self, repo: &Repository, name: &str, version: &str) -> Option<String> {
        Some(format!("{}/charts/{}-{}.tgz", origin(repo), name, version))
    }

    fn artifact_path(&self, repo: &Repository, name: &str, version: &str) -> PathBuf {
        repo.storage_path
            .join("charts")
            .join(format!("{}-{}.tgz", name, version))
    }

    fn bootstrap(&self, repo_type: RepositoryType) -> Bootstrap {
        match repo_type {
            RepositoryType::Hosted => Bootstrap::EmptyIndex,
            RepositoryType::Proxy => Bootstrap::DownloadIndex,
            RepositoryType::Group => Bootstrap::Nothing,
        }
    }
}

impl FormatAdapter for GitAdapter {
    fn format(&self) -> Format {
        Format::Git
    }

    fn remote_url(&self, _repo: &Repository, _name: &str, _version: &str) -> Option<String> {
        None
    }

    /// A Git repository is a single bare repository
    fn artifact_path(&self, repo: &Repository, _name: &str, _version: &str) -> PathBuf {
        repo.storage_path.clone()
    }

    fn bootstrap(&self, repo_type: RepositoryType) -> Bootstrap {
        match repo_type {
            RepositoryType::Hosted => Bootstrap::InitBare,
            RepositoryType::Proxy => Bootstrap::MirrorClone,
            RepositoryType::Group => Bootstrap::Nothing,
        }
    }
}

/// Reject artifact names and versions that would escape the repository root
///
/// Docker image names may contain `/`; nothing else may.
pub fn validate_artifact_key(format: Format, name: &str, version: &str) -> Result<()> {
    let bad_segment = |s: &str| s.is_empty() || s == "." || s == "..";

    if name.is_empty() || name.starts_with('/') || name.contains('\\') {
        return Err(RepoError::invalid(format!("invalid artifact name '{}'", name)));
    }
    if format == Format::Docker {
        if name.split('/').any(bad_segment) {
            return Err(RepoError::invalid(format!("invalid image name '{}'", name)));
        }
    } else if name.contains('/') || bad_segment(name) {
        return Err(RepoError::invalid(format!("invalid artifact name '{}'", name)));
    }

    if bad_segment(version) || version.contains('/') || version.contains('\\') {
        return Err(RepoError::invalid(format!(
            "invalid artifact version '{}'",
            version
        )));
    }
    Ok(())
}
