//! Docker image manifests
//!
//! Two shapes are understood: registry manifests (schema 1, schema 2, OCI
//! image manifest and manifest lists) as served by `/v2/<name>/manifests/<tag>`,
//! and the `manifest.json` written by `docker save`.

use serde::Deserialize;

use crate::error::{CoreError, Result};

/// A registry manifest document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    #[serde(default)]
    pub schema_version: Option<u32>,

    #[serde(default)]
    pub media_type: Option<String>,

    /// Schema 2 / OCI layers
    #[serde(default)]
    pub layers: Vec<Descriptor>,

    /// Schema 1 layers
    #[serde(default)]
    pub fs_layers: Vec<FsLayer>,

    /// Manifest list / OCI index entries
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: Option<String>,
    pub digest: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLayer {
    pub blob_sum: String,
}

impl ImageManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let manifest: ImageManifest = serde_json::from_slice(bytes)?;
        if manifest.schema_version.is_none() && manifest.media_type.is_none() {
            return Err(CoreError::InvalidManifest {
                message: "neither schemaVersion nor mediaType is set".to_string(),
            });
        }
        Ok(manifest)
    }

    pub fn is_index(&self) -> bool {
        !self.manifests.is_empty()
    }

    /// Digests in manifest order
    ///
    /// For a manifest list these are the platform manifest digests.
    pub fn layer_digests(&self) -> Vec<String> {
        if !self.layers.is_empty() {
            self.layers.iter().map(|l| l.digest.clone()).collect()
        } else if !self.fs_layers.is_empty() {
            // Schema 1 lists layers top-most first
            self.fs_layers
                .iter()
                .rev()
                .map(|l| l.blob_sum.clone())
                .collect()
        } else {
            self.manifests.iter().map(|m| m.digest.clone()).collect()
        }
    }
}

/// `manifest.json` from a `docker save` archive
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveManifest(pub Vec<ArchiveImage>);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveImage {
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub repo_tags: Vec<String>,
    #[serde(default)]
    pub layers: Vec<String>,
}

impl ArchiveManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let manifest: ArchiveManifest = serde_json::from_slice(bytes)?;
        if manifest.0.is_empty() {
            return Err(CoreError::InvalidManifest {
                message: "image archive manifest lists no images".to_string(),
            });
        }
        Ok(manifest)
    }

    /// Layers of the first image in the archive
    pub fn layers(&self) -> Vec<String> {
        self.0
            .first()
            .map(|image| image.layers.clone())
            .unwrap_or_default()
    }
}
