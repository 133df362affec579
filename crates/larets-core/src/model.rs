//! Repository, artifact and group membership records
//!
//! Docker, Git and Helm repositories share one record shape. Anything that
//! only makes sense for one format lives in [`FormatOptions`] (repositories)
//! or [`ArtifactDetails`] (artifacts).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// Artifact format. Each format is an independent repository namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Docker,
    Git,
    Helm,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Docker, Format::Git, Format::Helm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Docker => "docker",
            Format::Git => "git",
            Format::Helm => "helm",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Format::Docker),
            "git" => Ok(Format::Git),
            "helm" => Ok(Format::Helm),
            _ => Err(CoreError::UnknownFormat {
                value: s.to_string(),
            }),
        }
    }
}

/// Repository semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// Writable origin, artifacts are published into it
    Hosted,
    /// Read-through cache in front of a remote origin
    Proxy,
    /// Ordered aggregate of other repositories
    Group,
}

impl RepositoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryType::Hosted => "hosted",
            RepositoryType::Proxy => "proxy",
            RepositoryType::Group => "group",
        }
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepositoryType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hosted" => Ok(RepositoryType::Hosted),
            "proxy" => Ok(RepositoryType::Proxy),
            "group" => Ok(RepositoryType::Group),
            _ => Err(CoreError::UnknownRepositoryType {
                value: s.to_string(),
            }),
        }
    }
}

/// Format-specific repository settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum FormatOptions {
    #[serde(rename_all = "camelCase")]
    Docker { index_type: String },

    #[serde(rename_all = "camelCase")]
    Git {
        branch: String,
        clone_enabled: bool,
        push_enabled: bool,
    },

    #[serde(rename_all = "camelCase")]
    Helm {
        /// Index file location, relative to the repository storage path
        index_path: String,
    },
}

pub const DEFAULT_GIT_BRANCH: &str = "master";
pub const DEFAULT_HELM_INDEX: &str = "index.yaml";

impl FormatOptions {
    /// Default options for a new repository
    pub fn defaults(format: Format, repo_type: RepositoryType) -> Self {
        match format {
            Format::Docker => FormatOptions::Docker {
                index_type: "v2".to_string(),
            },
            Format::Git => FormatOptions::Git {
                branch: DEFAULT_GIT_BRANCH.to_string(),
                clone_enabled: true,
                push_enabled: repo_type == RepositoryType::Hosted,
            },
            Format::Helm => FormatOptions::Helm {
                index_path: DEFAULT_HELM_INDEX.to_string(),
            },
        }
    }

    pub fn format(&self) -> Format {
        match self {
            FormatOptions::Docker { .. } => Format::Docker,
            FormatOptions::Git { .. } => Format::Git,
            FormatOptions::Helm { .. } => Format::Helm,
        }
    }
}

/// A repository record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: i64,
    pub format: Format,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub repo_type: RepositoryType,
    /// Remote origin, empty unless this is a proxy
    #[serde(default)]
    pub url: String,
    pub cache_enabled: bool,
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    pub storage_path: PathBuf,
    pub options: FormatOptions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    pub fn is_hosted(&self) -> bool {
        self.repo_type == RepositoryType::Hosted
    }

    pub fn is_proxy(&self) -> bool {
        self.repo_type == RepositoryType::Proxy
    }

    pub fn is_group(&self) -> bool {
        self.repo_type == RepositoryType::Group
    }

    /// Absolute path of the Helm index file
    pub fn index_file(&self) -> Option<PathBuf> {
        match &self.options {
            FormatOptions::Helm { index_path } => Some(self.storage_path.join(index_path)),
            _ => None,
        }
    }

    /// Default branch of a Git repository
    pub fn branch(&self) -> Option<&str> {
        match &self.options {
            FormatOptions::Git { branch, .. } => Some(branch),
            _ => None,
        }
    }
}

/// A published or cached artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: i64,
    pub repository_id: i64,
    pub format: Format,
    pub name: String,
    /// Docker tag or chart version
    pub version: String,
    pub path: PathBuf,
    pub size: u64,
    #[serde(default)]
    pub sha256: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub details: ArtifactDetails,
}

/// Format extension of an artifact record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArtifactDetails {
    #[default]
    None,
    Docker(ImageDetails),
    Helm(ChartDetails),
}

impl ArtifactDetails {
    /// Details recorded when extraction is not possible
    pub fn fallback(format: Format, version: &str) -> Self {
        match format {
            Format::Docker => ArtifactDetails::Docker(ImageDetails {
                tag: version.to_string(),
                ..Default::default()
            }),
            Format::Helm => ArtifactDetails::Helm(ChartDetails::default()),
            Format::Git => ArtifactDetails::None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDetails {
    pub tag: String,
    /// Raw manifest document, kept for images fetched from a registry
    #[serde(default)]
    pub manifest: Option<String>,
    /// Layer digests in manifest order
    #[serde(default)]
    pub layers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDetails {
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,
}

/// Dependency declared in a chart's Chart.yaml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartDependency {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub repository: Option<String>,
}

/// Membership of a repository in a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub group_id: i64,
    pub member_id: i64,
    pub member_name: String,
    pub member_type: RepositoryType,
    pub priority: i32,
}

impl GroupMember {
    /// Sort members into resolution order: lowest priority value first,
    /// ties broken by member name.
    pub fn resolution_order(members: &mut [GroupMember]) {
        members.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.member_name.cmp(&b.member_name))
        });
    }
}
