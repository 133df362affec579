//! Display formatting for CLI output
//!
//! Every command prints either a table for humans or, with `--json`, the
//! engine's records serialized as-is.

use console::style;
use larets_core::{Artifact, ArtifactDetails, GroupMember, Repository, RepositoryType};
use larets_repo::{GitRepositoryInfo, SearchHit};
use serde::Serialize;

use crate::error::Result;
use crate::util::{format_size, format_ttl, truncate_hash};

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn kind(repo_type: RepositoryType) -> console::StyledObject<&'static str> {
    match repo_type {
        RepositoryType::Hosted => style("hosted").green(),
        RepositoryType::Proxy => style("proxy").cyan(),
        RepositoryType::Group => style("group").magenta(),
    }
}

pub fn repository_table(repos: &[Repository]) {
    println!("{:<24} {:<8} {:<10} URL", "NAME", "TYPE", "CACHE TTL");
    println!("{}", "-".repeat(80));

    for repo in repos {
        let ttl = if repo.is_proxy() && !repo.cache_enabled {
            "off".to_string()
        } else {
            format_ttl(repo.cache_ttl)
        };
        println!(
            "{:<24} {:<8} {:<10} {}",
            repo.name,
            repo.repo_type.as_str(),
            ttl,
            repo.url
        );
    }
}

pub fn repository_detail(repo: &Repository) {
    println!("{} {}", style(repo.format).bold(), style(&repo.name).cyan().bold());
    println!("  Type:        {}", kind(repo.repo_type));
    if !repo.description.is_empty() {
        println!("  Description: {}", repo.description);
    }
    if !repo.url.is_empty() {
        println!("  URL:         {}", repo.url);
    }
    if repo.is_proxy() {
        let cache = if repo.cache_enabled {
            format_ttl(repo.cache_ttl)
        } else {
            "disabled".to_string()
        };
        println!("  Cache TTL:   {}", cache);
    }
    if let Some(branch) = repo.branch() {
        println!("  Branch:      {}", branch);
    }
    if let Some(index) = repo.index_file() {
        println!("  Index:       {}", index.display());
    }
    println!("  Storage:     {}", repo.storage_path.display());
    println!("  Created:     {}", repo.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Updated:     {}", repo.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
}

fn summary(artifact: &Artifact) -> String {
    match &artifact.details {
        ArtifactDetails::Helm(chart) => chart
            .description
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(40)
            .collect(),
        ArtifactDetails::Docker(image) if !image.layers.is_empty() => {
            format!("{} layer(s)", image.layers.len())
        }
        _ => String::new(),
    }
}

pub fn artifact_table(artifacts: &[Artifact]) {
    println!(
        "{:<30} {:<15} {:>10} {:<14} DETAILS",
        "NAME", "VERSION", "SIZE", "SHA256"
    );
    println!("{}", "-".repeat(90));

    for artifact in artifacts {
        println!(
            "{:<30} {:<15} {:>10} {:<14} {}",
            artifact.name,
            artifact.version,
            format_size(artifact.size),
            truncate_hash(artifact.sha256.as_deref().unwrap_or("-"), 12),
            summary(artifact)
        );
    }
}

pub fn search_table(hits: &[SearchHit]) {
    println!("{:<40} {:<15} {:>10}", "NAME", "VERSION", "SIZE");
    println!("{}", "-".repeat(70));

    for hit in hits {
        println!(
            "{:<40} {:<15} {:>10}",
            format!("{}/{}", hit.repository, hit.artifact.name),
            hit.artifact.version,
            format_size(hit.artifact.size)
        );
    }
}

pub fn published(artifact: &Artifact) {
    println!(
        "{} Published {}:{} ({})",
        style("✓").green(),
        style(&artifact.name).bold(),
        artifact.version,
        format_size(artifact.size)
    );
    if let Some(sha) = &artifact.sha256 {
        println!("  sha256: {}", sha);
    }
}

pub fn member_table(members: &[GroupMember]) {
    println!("{:<10} {:<24} TYPE", "PRIORITY", "MEMBER");
    println!("{}", "-".repeat(45));

    for member in members {
        println!(
            "{:<10} {:<24} {}",
            member.priority,
            member.member_name,
            kind(member.member_type)
        );
    }
}

pub fn git_info(info: &GitRepositoryInfo) {
    repository_detail(&info.repository);

    println!();
    println!("{}", style("Branches").bold());
    if info.branches.is_empty() {
        println!("  {}", style("(none)").dim());
    }
    for branch in &info.branches {
        let marker = if info.repository.branch() == Some(branch.as_str()) {
            "*"
        } else {
            " "
        };
        println!("  {} {}", marker, branch);
    }

    println!();
    println!("{}", style("Recent commits").bold());
    if info.recent_commits.is_empty() {
        println!("  {}", style("(no commits yet)").dim());
    }
    for commit in &info.recent_commits {
        println!(
            "  {} {}",
            style(truncate_hash(&commit.id, 8)).yellow(),
            commit.summary
        );
    }
}
