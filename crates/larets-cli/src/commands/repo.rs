//! Repository management commands

use console::style;
use larets_core::Format;
use larets_repo::{CreateRepository, Engine};

use crate::display;
use crate::error::Result;

/// Create a repository
pub async fn create(
    engine: &Engine,
    format: Format,
    request: CreateRepository,
    json: bool,
) -> Result<()> {
    let repo = engine.create_repository(format, request).await?;

    if json {
        return display::print_json(&repo);
    }

    println!(
        "{} Created {} {} repository \"{}\"",
        style("✓").green(),
        repo.repo_type,
        repo.format,
        repo.name
    );
    println!("  Storage: {}", repo.storage_path.display());
    if repo.is_group() {
        println!();
        println!(
            "Add members with: larets group add-member {} {} <repository>",
            repo.format, repo.name
        );
    }
    Ok(())
}

/// List repositories of a format
pub async fn list(engine: &Engine, format: Format, json: bool) -> Result<()> {
    let repos = engine.list_repositories(format).await?;

    if json {
        return display::print_json(&repos);
    }

    if repos.is_empty() {
        println!("No {} repositories.", format);
        println!();
        println!(
            "Create one with: larets repo create {} <name> --type hosted",
            format
        );
        return Ok(());
    }

    display::repository_table(&repos);
    Ok(())
}

/// Show one repository
pub async fn show(engine: &Engine, format: Format, name: &str, json: bool) -> Result<()> {
    let repo = engine.get_repository(format, name).await?;

    if json {
        return display::print_json(&repo);
    }

    display::repository_detail(&repo);
    Ok(())
}

pub async fn delete(engine: &Engine, format: Format, name: &str) -> Result<()> {
    engine.delete_repository(format, name).await?;
    println!("\"{}\" has been removed", name);
    Ok(())
}

/// Refresh a proxy repository from its origin
pub async fn sync(engine: &Engine, format: Format, name: &str, json: bool) -> Result<()> {
    let repo = engine.sync_repository(format, name).await?;

    if json {
        return display::print_json(&repo);
    }

    println!(
        "{} Synced \"{}\" from {}",
        style("✓").green(),
        repo.name,
        repo.url
    );
    Ok(())
}
