//! Larets repository engine
//!
//! Hosted, proxy and group repositories for Docker images, Git repositories
//! and Helm charts:
//!
//! - **Registry**: repository records kept consistent with their storage
//! - **Artifact store**: streamed, atomic publishing to hosted repositories
//! - **Fetch cache**: proxy reads served from disk until the cache TTL expires,
//!   with one origin request per artifact at a time
//!
//! ## Example
//!
//! ```rust,no_run
//! use larets_core::{Format, RepositoryType};
//! use larets_repo::{CreateRepository, Engine, EngineConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::open(EngineConfig::load(None)?)?;
//!
//! engine
//!     .create_repository(
//!         Format::Helm,
//!         CreateRepository::new("bitnami", RepositoryType::Proxy)
//!             .with_url("https://charts.bitnami.com/bitnami"),
//!     )
//!     .await?;
//!
//! let path = engine
//!     .fetch_artifact(Format::Helm, "bitnami", "nginx", "15.0.0")
//!     .await?;
//! println!("cached at {}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod flight;
pub mod format;
pub mod index;
pub mod paths;
pub mod registry;
pub mod remote;
pub mod store;
pub mod tools;

#[cfg(test)]
mod testutil;

pub use artifacts::ArtifactStore;
pub use cache::FetchCache;
pub use config::{EngineConfig, FormatToggles};
pub use engine::{Engine, EngineParts};
pub use error::{RepoError, Result};
pub use format::{FormatAdapter, adapter};
pub use index::{ChartEntry, ChartIndex};
pub use paths::StoragePaths;
pub use registry::{CreateRepository, GitRepositoryInfo, RepositoryRegistry};
pub use remote::HttpOrigin;
pub use store::{MemoryStore, MetadataStore, SearchHit, SqliteStore};
pub use tools::{CommitSummary, GitCli, NativeIndexer, PackagingTool, VersionControlTool};
