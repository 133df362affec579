//! CLI error types with exit code handling
//!
//! Engine errors are mapped onto a small set of categories, each with its
//! own exit code and, where it helps, a hint.

use larets_core::CoreError;
use larets_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// The request was rejected before anything changed
    #[error("{message}")]
    #[diagnostic(code(larets::cli::invalid))]
    Invalid {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Missing repository, artifact or disabled format
    #[error("{message}")]
    #[diagnostic(code(larets::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Name or version already taken
    #[error("{message}")]
    #[diagnostic(code(larets::cli::conflict))]
    Conflict {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Remote origin failure
    #[error("{message}")]
    #[diagnostic(code(larets::cli::remote))]
    Remote { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(larets::cli::not_implemented),
        help("This operation is not supported by this version of larets")
    )]
    NotImplemented { message: String },

    #[error("{message}")]
    #[diagnostic(code(larets::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(larets::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("{message}")]
    #[diagnostic(code(larets::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Invalid { .. } => exit_codes::INVALID_REQUEST,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Conflict { .. } => exit_codes::CONFLICT,
            CliError::Remote { .. } => exit_codes::REMOTE_ERROR,
            CliError::NotImplemented { .. } => exit_codes::NOT_IMPLEMENTED,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an input error (user provided invalid input)
    pub fn input(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
            help: None,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        let message = err.to_string();
        match err {
            RepoError::InvalidRequest { .. } => CliError::Invalid {
                message,
                help: None,
            },
            RepoError::WrongRepositoryType { expected, .. } => CliError::Invalid {
                message,
                help: Some(format!("Use a {} repository for this operation", expected)),
            },
            RepoError::RepositoryNotFound { format, .. } => CliError::NotFound {
                message,
                help: Some(format!(
                    "Run 'larets repo list {}' to see existing repositories",
                    format
                )),
            },
            RepoError::ArtifactNotFound { .. } => CliError::NotFound {
                message,
                help: None,
            },
            RepoError::FormatDisabled { format } => CliError::NotFound {
                message,
                help: Some(format!(
                    "Enable it with formats.{} in the config file or LARETS_ENABLE_{}=true",
                    format,
                    format.as_str().to_ascii_uppercase()
                )),
            },
            RepoError::DuplicateName { .. } => CliError::Conflict {
                message,
                help: Some("Repository names are unique within a format".to_string()),
            },
            RepoError::ArtifactExists { .. } => CliError::Conflict {
                message,
                help: Some("Published versions are immutable; publish a new version".to_string()),
            },
            RepoError::RemoteFetch { .. } | RepoError::Timeout { .. } => {
                CliError::Remote { message }
            }
            RepoError::NotImplemented { .. } => CliError::NotImplemented { message },
            RepoError::InvalidConfig { .. } => CliError::Config {
                message,
                help: Some("Check the config file given with --config and LARETS_* variables".to_string()),
            },
            RepoError::Storage { .. } => CliError::Io { message },
            RepoError::Persistence { .. } | RepoError::Internal { .. } => {
                CliError::Internal { message }
            }
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            other => CliError::input(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::internal(format!("Failed to render JSON: {}", err))
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use larets_core::{Format, RepositoryType};

    #[test]
    fn test_engine_errors_map_to_exit_codes() {
        let cases = vec![
            (RepoError::invalid("bad"), exit_codes::INVALID_REQUEST),
            (
                RepoError::wrong_type("charts", RepositoryType::Proxy, RepositoryType::Hosted),
                exit_codes::INVALID_REQUEST,
            ),
            (
                RepoError::RepositoryNotFound {
                    format: Format::Helm,
                    name: "x".to_string(),
                },
                exit_codes::NOT_FOUND,
            ),
            (
                RepoError::FormatDisabled {
                    format: Format::Docker,
                },
                exit_codes::NOT_FOUND,
            ),
            (
                RepoError::DuplicateName {
                    format: Format::Git,
                    name: "x".to_string(),
                },
                exit_codes::CONFLICT,
            ),
            (
                RepoError::remote("https://example.com", Some(500), "boom"),
                exit_codes::REMOTE_ERROR,
            ),
            (
                RepoError::not_implemented("delete"),
                exit_codes::NOT_IMPLEMENTED,
            ),
            (
                RepoError::persistence("insert", "locked"),
                exit_codes::ERROR,
            ),
        ];

        for (err, code) in cases {
            let description = err.to_string();
            assert_eq!(CliError::from(err).exit_code(), code, "{}", description);
        }
    }

    #[test]
    fn test_message_is_kept() {
        let err = CliError::from(RepoError::DuplicateName {
            format: Format::Helm,
            name: "charts".to_string(),
        });
        assert_eq!(err.to_string(), "Repository already exists: helm/charts");
    }

    #[test]
    fn test_disabled_format_hint() {
        let err = CliError::from(RepoError::FormatDisabled {
            format: Format::Docker,
        });
        match err {
            CliError::NotFound { help: Some(help), .. } => {
                assert!(help.contains("LARETS_ENABLE_DOCKER"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
