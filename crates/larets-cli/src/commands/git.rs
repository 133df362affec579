//! Git repository commands

use console::style;
use larets_repo::Engine;

use crate::display;
use crate::error::Result;

/// Branches and recent commits of a Git repository
pub async fn info(engine: &Engine, repo: &str, json: bool) -> Result<()> {
    let info = engine.git_info(repo).await?;

    if json {
        return display::print_json(&info);
    }

    display::git_info(&info);
    Ok(())
}

pub async fn create_branch(engine: &Engine, repo: &str, branch: &str, from: Option<&str>) -> Result<()> {
    engine.create_branch(repo, branch, from).await?;
    println!(
        "{} Created branch {} in \"{}\"",
        style("✓").green(),
        style(branch).bold(),
        repo
    );
    Ok(())
}

pub async fn delete_branch(engine: &Engine, repo: &str, branch: &str) -> Result<()> {
    engine.delete_branch(repo, branch).await?;
    println!(
        "{} Deleted branch {} from \"{}\"",
        style("✓").green(),
        style(branch).bold(),
        repo
    );
    Ok(())
}
