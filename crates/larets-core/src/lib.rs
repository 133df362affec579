//! Larets Core - domain types for the artifact repository manager
//!
//! This crate provides the types shared by the engine and its front-ends:
//! - `Repository`: a hosted, proxy or group repository of one format
//! - `Artifact`: a published or cached unit of content
//! - `GroupMember`: membership of a repository in a group
//! - `MetadataExtractor`: chart and image metadata extraction

pub mod archive;
pub mod chart;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod model;

pub use chart::ChartMetadata;
pub use error::{CoreError, Result};
pub use extract::{ArchiveExtractor, MetadataExtractor};
pub use manifest::{ArchiveManifest, ImageManifest};
pub use model::{
    Artifact, ArtifactDetails, ChartDependency, ChartDetails, Format, FormatOptions, GroupMember,
    ImageDetails, Repository, RepositoryType,
};
