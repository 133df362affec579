//! Error types for engine operations

use larets_core::{CoreError, Format, RepositoryType};
use std::fmt::Display;
use std::path::Path;
use thiserror::Error;

/// Engine operation errors
///
/// `Clone` so every caller waiting on a shared in-flight fetch receives
/// the leader's failure.
#[derive(Debug, Clone, Error)]
pub enum RepoError {
    // ============ Lookup Errors ============
    #[error("Repository not found: {format}/{name}")]
    RepositoryNotFound { format: Format, name: String },

    #[error("Artifact not found: {name}:{version} in repository {repo}")]
    ArtifactNotFound {
        repo: String,
        name: String,
        version: String,
    },

    // ============ Conflict Errors ============
    #[error("Repository already exists: {format}/{name}")]
    DuplicateName { format: Format, name: String },

    #[error("Artifact already exists: {name}:{version} in repository {repo}")]
    ArtifactExists {
        repo: String,
        name: String,
        version: String,
    },

    // ============ Request Errors ============
    #[error("Repository {name} is a {actual} repository, operation requires {expected}")]
    WrongRepositoryType {
        name: String,
        expected: RepositoryType,
        actual: RepositoryType,
    },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Format {format} is disabled")]
    FormatDisabled { format: Format },

    // ============ Local Failures ============
    #[error("Storage error at {path}: {message}")]
    Storage { path: String, message: String },

    #[error("Metadata store error during {operation}: {message}")]
    Persistence { operation: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ============ Remote Failures ============
    #[error("Remote fetch from {url} failed: {message}")]
    RemoteFetch {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    // ============ Other ============
    #[error("Not implemented: {operation}")]
    NotImplemented { operation: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    pub fn storage(path: &Path, err: impl Display) -> Self {
        RepoError::Storage {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    pub fn persistence(operation: &str, err: impl Display) -> Self {
        RepoError::Persistence {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }

    pub fn remote(url: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        RepoError::RemoteFetch {
            url: url.to_string(),
            status,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        RepoError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn not_implemented(operation: impl Into<String>) -> Self {
        RepoError::NotImplemented {
            operation: operation.into(),
        }
    }

    pub fn wrong_type(name: &str, expected: RepositoryType, actual: RepositoryType) -> Self {
        RepoError::WrongRepositoryType {
            name: name.to_string(),
            expected,
            actual,
        }
    }

    /// The origin answered 404 for the requested artifact
    pub fn is_remote_not_found(&self) -> bool {
        matches!(self, RepoError::RemoteFetch { status: Some(404), .. })
    }

    /// HTTP status a transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            RepoError::DuplicateName { .. } | RepoError::ArtifactExists { .. } => 409,
            RepoError::InvalidRequest { .. } | RepoError::WrongRepositoryType { .. } => 400,
            RepoError::RepositoryNotFound { .. }
            | RepoError::ArtifactNotFound { .. }
            | RepoError::FormatDisabled { .. } => 404,
            RepoError::RemoteFetch { status: Some(404), .. } => 404,
            RepoError::RemoteFetch { .. } => 502,
            RepoError::Timeout { .. } => 504,
            RepoError::NotImplemented { .. } => 501,
            RepoError::Storage { .. }
            | RepoError::Persistence { .. }
            | RepoError::InvalidConfig { .. }
            | RepoError::Internal { .. } => 500,
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Internal {
            message: format!("YAML serialization failed: {}", e),
        }
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Internal {
            message: format!("JSON serialization failed: {}", e),
        }
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidRequest {
            message: format!("Invalid URL: {}", e),
        }
    }
}

impl From<CoreError> for RepoError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnknownFormat { .. } | CoreError::UnknownRepositoryType { .. } => {
                RepoError::InvalidRequest {
                    message: e.to_string(),
                }
            }
            other => RepoError::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl From<tokio::task::JoinError> for RepoError {
    fn from(e: tokio::task::JoinError) -> Self {
        RepoError::Internal {
            message: format!("Background task failed: {}", e),
        }
    }
}
