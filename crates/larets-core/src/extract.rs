//! Metadata extraction from stored payloads

use std::path::Path;

use crate::archive::{read_chart_metadata, read_image_archive_manifest};
use crate::error::Result;
use crate::manifest::ImageManifest;
use crate::model::{ArtifactDetails, Format, ImageDetails};

/// Turns a stored payload into format-specific artifact details
///
/// Implementations do blocking file I/O; async callers should run them
/// on a blocking thread.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, format: Format, version: &str, path: &Path) -> Result<ArtifactDetails>;
}

/// Reads chart packages, registry manifests and `docker save` archives
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl MetadataExtractor for ArchiveExtractor {
    fn extract(&self, format: Format, version: &str, path: &Path) -> Result<ArtifactDetails> {
        match format {
            Format::Helm => {
                let meta = read_chart_metadata(path)?;
                Ok(ArtifactDetails::Helm(meta.details()))
            }
            Format::Docker => extract_image(version, path),
            Format::Git => Ok(ArtifactDetails::None),
        }
    }
}

fn extract_image(tag: &str, path: &Path) -> Result<ArtifactDetails> {
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        let raw = std::fs::read(path)?;
        let manifest = ImageManifest::parse(&raw)?;
        Ok(ArtifactDetails::Docker(ImageDetails {
            tag: tag.to_string(),
            layers: manifest.layer_digests(),
            manifest: Some(String::from_utf8_lossy(&raw).into_owned()),
        }))
    } else {
        let manifest = read_image_archive_manifest(path)?;
        Ok(ArtifactDetails::Docker(ImageDetails {
            tag: tag.to_string(),
            manifest: None,
            layers: manifest.layers(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::{write_tar, write_tgz};
    use tempfile::TempDir;

    #[test]
    fn test_extract_helm() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app-1.0.0.tgz");
        write_tgz(
            &path,
            &[("app/Chart.yaml", "name: app\nversion: 1.0.0\ndescription: demo\n")],
        );

        match ArchiveExtractor.extract(Format::Helm, "1.0.0", &path).unwrap() {
            ArtifactDetails::Helm(chart) => assert_eq!(chart.description.as_deref(), Some("demo")),
            other => panic!("Expected helm details, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_registry_manifest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{"schemaVersion":2,"layers":[{"digest":"sha256:l1"}]}"#,
        )
        .unwrap();

        match ArchiveExtractor.extract(Format::Docker, "v1", &path).unwrap() {
            ArtifactDetails::Docker(image) => {
                assert_eq!(image.tag, "v1");
                assert_eq!(image.layers, vec!["sha256:l1"]);
                assert!(image.manifest.unwrap().contains("schemaVersion"));
            }
            other => panic!("Expected docker details, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_saved_image() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("image.tar");
        write_tar(
            &path,
            &[("manifest.json", r#"[{"Layers":["x/layer.tar"]}]"#)],
        );

        match ArchiveExtractor.extract(Format::Docker, "latest", &path).unwrap() {
            ArtifactDetails::Docker(image) => {
                assert_eq!(image.layers, vec!["x/layer.tar"]);
                assert!(image.manifest.is_none());
            }
            other => panic!("Expected docker details, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_git_is_empty() {
        let details = ArchiveExtractor
            .extract(Format::Git, "main", Path::new("/nonexistent"))
            .unwrap();
        assert_eq!(details, ArtifactDetails::None);
    }
}
