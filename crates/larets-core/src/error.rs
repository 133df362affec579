//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown artifact format: {value}")]
    UnknownFormat { value: String },

    #[error("Unknown repository type: {value}")]
    UnknownRepositoryType { value: String },

    #[error("Invalid chart archive: {message}")]
    InvalidChart { message: String },

    #[error("Invalid image manifest: {message}")]
    InvalidManifest { message: String },

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("Failed to parse Chart.yaml: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
