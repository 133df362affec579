//! Artifact commands: publish, fetch, list and search

use larets_core::{Format, archive};
use larets_repo::Engine;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::display;
use crate::error::{CliError, Result};

/// Name and version of the artifact in `file`
///
/// Charts carry both in `Chart.yaml`; flags win when given.
fn artifact_key(
    format: Format,
    file: &Path,
    name: Option<&str>,
    version: Option<&str>,
) -> Result<(String, String)> {
    if let (Some(name), Some(version)) = (name, version) {
        return Ok((name.to_string(), version.to_string()));
    }

    match format {
        Format::Helm => {
            let chart = archive::read_chart_metadata(file)?;
            Ok((
                name.map(str::to_string).unwrap_or(chart.name),
                version.map(str::to_string).unwrap_or(chart.version),
            ))
        }
        Format::Docker => Err(CliError::input_with_help(
            "Image name and tag are required",
            "Pass --name <image> --version <tag>",
        )),
        Format::Git => Err(CliError::input_with_help(
            "Git repositories are published with git itself",
            "Push to the repository's storage path instead",
        )),
    }
}

/// Publish a file to a hosted repository
pub async fn publish(
    engine: &Engine,
    format: Format,
    repo: &str,
    file: &Path,
    name: Option<&str>,
    version: Option<&str>,
    json: bool,
) -> Result<()> {
    if !file.is_file() {
        return Err(CliError::input(format!("File not found: {}", file.display())));
    }
    let (name, version) = artifact_key(format, file, name, version)?;

    let mut payload = tokio::fs::File::open(file).await?;
    let artifact = engine
        .store_artifact(format, repo, &name, &version, &mut payload)
        .await?;

    if json {
        return display::print_json(&artifact);
    }

    display::published(&artifact);
    Ok(())
}

#[derive(Serialize)]
struct Fetched {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
}

/// Fetch an artifact through a proxy repository
pub async fn fetch(
    engine: &Engine,
    format: Format,
    repo: &str,
    name: &str,
    version: &str,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let path = engine.fetch_artifact(format, repo, name, version).await?;

    if let Some(output) = output {
        tokio::fs::copy(&path, output).await?;
    }

    if json {
        return display::print_json(&Fetched {
            path,
            output: output.map(Path::to_path_buf),
        });
    }

    match output {
        Some(output) => println!("{}", output.display()),
        None => println!("{}", path.display()),
    }
    Ok(())
}

/// List artifacts of a repository
pub async fn list(engine: &Engine, format: Format, repo: &str, json: bool) -> Result<()> {
    let artifacts = engine.list_artifacts(format, repo).await?;

    if json {
        return display::print_json(&artifacts);
    }

    if artifacts.is_empty() {
        println!("No artifacts in \"{}\".", repo);
        return Ok(());
    }

    display::artifact_table(&artifacts);
    Ok(())
}

/// Search artifacts across repositories of a format
pub async fn search(engine: &Engine, format: Format, query: &str, json: bool) -> Result<()> {
    let hits = engine.search_artifacts(format, query).await?;

    if json {
        return display::print_json(&hits);
    }

    if hits.is_empty() {
        println!("No {} artifacts found matching '{}'", format, query);
        return Ok(());
    }

    display::search_table(&hits);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_take_precedence() {
        let (name, version) = artifact_key(
            Format::Docker,
            Path::new("/nonexistent.tar"),
            Some("team/app"),
            Some("1.0"),
        )
        .unwrap();
        assert_eq!(name, "team/app");
        assert_eq!(version, "1.0");
    }

    #[test]
    fn test_docker_requires_name_and_tag() {
        let err = artifact_key(Format::Docker, Path::new("image.tar"), Some("app"), None).unwrap_err();
        assert!(matches!(err, CliError::Invalid { .. }));
    }

    #[test]
    fn test_unreadable_chart() {
        let err = artifact_key(Format::Helm, Path::new("/nonexistent.tgz"), None, None).unwrap_err();
        assert!(matches!(err, CliError::Io { .. } | CliError::Invalid { .. }));
    }
}
