//! Reading entries out of artifact archives
//!
//! Chart packages are `.tgz` files with a single top-level directory.
//! Image archives produced by `docker save` are plain or gzipped tarballs
//! carrying a `manifest.json` at their root.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tar::Archive;

use crate::chart::ChartMetadata;
use crate::error::{CoreError, Result};
use crate::manifest::ArchiveManifest;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Read the first archive entry accepted by `matches`
///
/// `matches` receives the entry path with any leading `./` removed.
pub fn read_entry<F>(archive_path: &Path, matches: F) -> Result<Option<(String, Vec<u8>)>>
where
    F: Fn(&str) -> bool,
{
    let reader = open_tar_stream(archive_path)?;
    let mut archive = Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }

        let raw = entry.path()?.to_string_lossy().to_string();
        let path = raw.trim_start_matches("./");
        if matches(path) {
            let path = path.to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(Some((path, content)));
        }
    }

    Ok(None)
}

/// Read a file by exact path
pub fn read_file_from_archive(archive_path: &Path, file_path: &str) -> Result<Vec<u8>> {
    read_entry(archive_path, |path| path == file_path)?
        .map(|(_, content)| content)
        .ok_or_else(|| CoreError::Archive {
            message: format!("File not found in archive: {}", file_path),
        })
}

/// Read and parse `<chart>/Chart.yaml` from a chart package
pub fn read_chart_metadata(archive_path: &Path) -> Result<ChartMetadata> {
    let (_, content) = read_entry(archive_path, is_chart_descriptor)?.ok_or_else(|| {
        CoreError::InvalidChart {
            message: format!("No Chart.yaml found in {}", archive_path.display()),
        }
    })?;

    let text = String::from_utf8(content).map_err(|e| CoreError::InvalidChart {
        message: format!("Invalid UTF-8 in Chart.yaml: {}", e),
    })?;
    ChartMetadata::parse(&text)
}

/// Read `manifest.json` from a `docker save` archive
pub fn read_image_archive_manifest(archive_path: &Path) -> Result<ArchiveManifest> {
    let content = read_file_from_archive(archive_path, "manifest.json")?;
    ArchiveManifest::parse(&content)
}

/// A chart's descriptor sits one level below the archive root.
/// Descriptors of bundled subcharts (`<chart>/charts/<sub>/Chart.yaml`) are ignored.
fn is_chart_descriptor(path: &str) -> bool {
    let mut parts = path.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(dir), Some("Chart.yaml"), None) if !dir.is_empty()
    )
}

/// Open a tar stream, transparently decompressing gzip
fn open_tar_stream(archive_path: &Path) -> Result<Box<dyn Read>> {
    let mut file = File::open(archive_path)?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;

    // Re-open rather than seek so the reader starts at byte zero either way
    let file = BufReader::new(File::open(archive_path)?);
    if read == 2 && magic == GZIP_MAGIC {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{write_tar, write_tgz};
    use super::*;
    use tempfile::TempDir;

    const CHART_YAML: &str = r#"apiVersion: v2
name: mychart
version: 1.0.0
appVersion: "2.3"
description: A test chart
keywords: [web, demo]
dependencies:
  - name: redis
    version: ">=17.0.0"
    repository: https://charts.example.com
"#;

    #[test]
    fn test_read_chart_metadata() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("mychart-1.0.0.tgz");
        write_tgz(
            &archive,
            &[
                ("mychart/values.yaml", "replicas: 1\n"),
                ("mychart/charts/redis/Chart.yaml", "name: redis\nversion: 17.0.0\n"),
                ("mychart/Chart.yaml", CHART_YAML),
            ],
        );

        let meta = read_chart_metadata(&archive).unwrap();
        assert_eq!(meta.name, "mychart");
        assert_eq!(meta.version, "1.0.0");
        assert_eq!(meta.app_version.as_deref(), Some("2.3"));
        assert_eq!(meta.keywords, vec!["web", "demo"]);
        assert_eq!(meta.dependencies.len(), 1);
    }

    #[test]
    fn test_read_chart_metadata_missing_descriptor() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.tgz");
        write_tgz(&archive, &[("broken/values.yaml", "a: 1\n")]);

        let err = read_chart_metadata(&archive).unwrap_err();
        assert!(matches!(err, CoreError::InvalidChart { .. }));
    }

    #[test]
    fn test_read_chart_metadata_not_an_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("junk.tgz");
        std::fs::write(&archive, b"definitely not a tarball").unwrap();

        assert!(read_chart_metadata(&archive).is_err());
    }

    #[test]
    fn test_read_image_archive_manifest_plain_tar() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("image.tar");
        let manifest = r#"[{"Config":"cfg.json","RepoTags":["app:1.0"],"Layers":["a/layer.tar","b/layer.tar"]}]"#;
        write_tar(&archive, &[("manifest.json", manifest), ("a/layer.tar", "")]);

        let parsed = read_image_archive_manifest(&archive).unwrap();
        assert_eq!(parsed.layers(), vec!["a/layer.tar", "b/layer.tar"]);
    }

    #[test]
    fn test_chart_descriptor_matching() {
        assert!(is_chart_descriptor("nginx/Chart.yaml"));
        assert!(!is_chart_descriptor("Chart.yaml"));
        assert!(!is_chart_descriptor("nginx/charts/sub/Chart.yaml"));
        assert!(!is_chart_descriptor("nginx/Chart.yaml.bak"));
    }
}
