//! Larets CLI - artifact repository manager for Docker, Git and Helm

use clap::{Parser, Subcommand};
use larets_core::{Format, RepositoryType};
use larets_repo::{Engine, EngineConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;
mod util;

use error::Result;

#[derive(Parser)]
#[command(name = "larets")]
#[command(author = "Larets Contributors")]
#[command(version)]
#[command(about = "Artifact repository manager for Docker images, Git repositories and Helm charts", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: <config dir>/larets/config.yaml if present)
    #[arg(long, global = true, env = "LARETS_CONFIG")]
    config: Option<PathBuf>,

    /// Output JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage repositories
    #[command(subcommand)]
    Repo(RepoCommands),

    /// Publish, fetch and find artifacts
    #[command(subcommand)]
    Artifact(ArtifactCommands),

    /// Inspect Git repositories and manage branches
    #[command(subcommand)]
    Git(GitCommands),

    /// Manage group repositories
    #[command(subcommand)]
    Group(GroupCommands),
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Create a repository
    Create {
        /// Format (docker, git, helm)
        format: Format,

        /// Repository name
        name: String,

        /// Repository type (hosted, proxy, group)
        #[arg(short = 't', long = "type")]
        repo_type: RepositoryType,

        /// Remote origin (proxy repositories only)
        #[arg(long)]
        url: Option<String>,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Default branch (git only)
        #[arg(long)]
        branch: Option<String>,

        /// Index file inside the repository (helm only)
        #[arg(long)]
        index_path: Option<String>,

        /// Cache TTL, e.g. `90m`, `2h` or bare minutes
        #[arg(long, value_parser = util::parse_ttl)]
        cache_ttl: Option<Duration>,

        /// Always ask the origin
        #[arg(long)]
        no_cache: bool,
    },

    /// List repositories of a format
    List { format: Format },

    /// Show one repository
    Show { format: Format, name: String },

    /// Delete a repository
    Delete { format: Format, name: String },

    /// Refresh a proxy repository from its origin
    Sync { format: Format, name: String },
}

#[derive(Subcommand)]
enum ArtifactCommands {
    /// Publish a file to a hosted repository
    #[command(disable_version_flag = true)]
    Publish {
        format: Format,

        /// Repository name
        repo: String,

        /// Chart package or image archive
        file: PathBuf,

        /// Artifact name (helm: read from Chart.yaml when omitted)
        #[arg(long)]
        name: Option<String>,

        /// Artifact version or tag (helm: read from Chart.yaml when omitted)
        #[arg(long)]
        version: Option<String>,
    },

    /// Fetch an artifact through a proxy repository
    #[command(disable_version_flag = true)]
    Fetch {
        format: Format,
        repo: String,
        name: String,
        version: String,

        /// Copy the artifact here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List artifacts of a repository
    List { format: Format, repo: String },

    /// Search artifacts by `name` or `name:version`
    Search { format: Format, query: String },
}

#[derive(Subcommand)]
enum GitCommands {
    /// Branches and recent commits
    Info { repo: String },

    /// Create a branch in a hosted repository
    BranchCreate {
        repo: String,
        branch: String,

        /// Start point (default: HEAD)
        #[arg(long)]
        from: Option<String>,
    },

    /// Delete a branch in a hosted repository
    BranchDelete { repo: String, branch: String },
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Add a repository to a group
    AddMember {
        format: Format,
        group: String,
        member: String,

        /// Lower values are consulted first
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        priority: i32,
    },

    /// Members in resolution order
    Members { format: Format, group: String },

    /// Repository a group resolves to
    Resolve { format: Format, group: String },
}

fn init_tracing(debug: bool) {
    let default = if debug { "larets=debug" } else { "larets=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::load(cli.config.as_deref())?;
    let engine = Engine::open(config)?;
    let json = cli.json;

    match cli.command {
        Commands::Repo(command) => match command {
            RepoCommands::Create {
                format,
                name,
                repo_type,
                url,
                description,
                branch,
                index_path,
                cache_ttl,
                no_cache,
            } => {
                let request = larets_repo::CreateRepository {
                    name,
                    repo_type: Some(repo_type),
                    url: url.unwrap_or_default(),
                    description,
                    cache_enabled: no_cache.then_some(false),
                    cache_ttl,
                    branch,
                    index_path,
                };
                commands::repo::create(&engine, format, request, json).await
            }
            RepoCommands::List { format } => commands::repo::list(&engine, format, json).await,
            RepoCommands::Show { format, name } => {
                commands::repo::show(&engine, format, &name, json).await
            }
            RepoCommands::Delete { format, name } => {
                commands::repo::delete(&engine, format, &name).await
            }
            RepoCommands::Sync { format, name } => {
                commands::repo::sync(&engine, format, &name, json).await
            }
        },

        Commands::Artifact(command) => match command {
            ArtifactCommands::Publish {
                format,
                repo,
                file,
                name,
                version,
            } => {
                commands::artifact::publish(
                    &engine,
                    format,
                    &repo,
                    &file,
                    name.as_deref(),
                    version.as_deref(),
                    json,
                )
                .await
            }
            ArtifactCommands::Fetch {
                format,
                repo,
                name,
                version,
                output,
            } => {
                commands::artifact::fetch(
                    &engine,
                    format,
                    &repo,
                    &name,
                    &version,
                    output.as_deref(),
                    json,
                )
                .await
            }
            ArtifactCommands::List { format, repo } => {
                commands::artifact::list(&engine, format, &repo, json).await
            }
            ArtifactCommands::Search { format, query } => {
                commands::artifact::search(&engine, format, &query, json).await
            }
        },

        Commands::Git(command) => match command {
            GitCommands::Info { repo } => commands::git::info(&engine, &repo, json).await,
            GitCommands::BranchCreate { repo, branch, from } => {
                commands::git::create_branch(&engine, &repo, &branch, from.as_deref()).await
            }
            GitCommands::BranchDelete { repo, branch } => {
                commands::git::delete_branch(&engine, &repo, &branch).await
            }
        },

        Commands::Group(command) => match command {
            GroupCommands::AddMember {
                format,
                group,
                member,
                priority,
            } => commands::group::add_member(&engine, format, &group, &member, priority, json).await,
            GroupCommands::Members { format, group } => {
                commands::group::members(&engine, format, &group, json).await
            }
            GroupCommands::Resolve { format, group } => {
                commands::group::resolve(&engine, format, &group, json).await
            }
        },
    }
}
