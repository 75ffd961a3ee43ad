//! RepoForge CLI - repository-grounded engineering assistant
//!
//! A thin composition root: wires configuration, provider chains, the
//! repository manager, the index, and the multi-agent orchestrator
//! together, then exposes subcommands that exercise the pipeline directly.
//!
//! # Usage
//!
//! ```bash
//! # Clone and register a repository
//! repoforge load https://github.com/owner/name
//!
//! # Build its semantic index
//! repoforge index <repo-id>
//!
//! # Ask a grounded question
//! repoforge ask <repo-id> "how does retry backoff work?"
//!
//! # Run the full router -> agents -> evaluator pipeline
//! repoforge smart <repo-id> "add a cache to the fetch path"
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

/// RepoForge - repository-grounded engineering assistant
#[derive(Parser, Debug)]
#[command(name = "repoforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands.
#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Path to a `repoforge.toml` configuration file.
    #[arg(long, short = 'c', global = true, env = "REPOFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug-level) logging.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Emit machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone (or archive-download) a repository and register it.
    Load(commands::load::LoadArgs),

    /// Build or refresh the semantic index for a registered repository.
    Index(commands::index::IndexArgs),

    /// Ask a grounded question, answered with file:line citations.
    Ask(commands::ask::AskArgs),

    /// Propose a code change grounded in the repository's own patterns.
    Generate(commands::generate::GenerateArgs),

    /// Route a request through the full multi-agent orchestrator.
    Smart(commands::smart::SmartArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.global.quiet {
        Level::ERROR
    } else if cli.global.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Load(args) => commands::load::execute(args, cli.global).await,
        Commands::Index(args) => commands::index::execute(args, cli.global).await,
        Commands::Ask(args) => commands::ask::execute(args, cli.global).await,
        Commands::Generate(args) => commands::generate::execute(args, cli.global).await,
        Commands::Smart(args) => commands::smart::execute(args, cli.global).await,
    }
}
