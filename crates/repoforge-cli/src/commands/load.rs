//! `load` command - clone/download a repository and register it.

use anyhow::{Context, Result};
use clap::Args;

use super::build_stack;
use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Repository URL (GitHub, GitLab, ...).
    url: String,

    /// Branch to check out; defaults to the repository's default branch.
    #[arg(long)]
    branch: Option<String>,
}

pub async fn execute(args: LoadArgs, global: GlobalOptions) -> Result<()> {
    let stack = build_stack(&global).await?;

    let record = stack
        .repo_manager
        .load(&args.url, args.branch.as_deref())
        .await
        .context("failed to load repository")?;

    if global.json {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({
            "repo_id": record.repo_id,
            "repo_name": record.repo_name,
            "commit_hash": record.commit_hash,
            "branch": record.branch,
            "files": record.stats.total_files,
        }))?);
    } else if !global.quiet {
        println!("Registered {} as {}", record.repo_name, record.repo_id);
        println!("  commit: {}", record.commit_hash);
        println!("  branch: {}", record.branch);
        println!("  files:  {}", record.stats.total_files);
    }

    Ok(())
}
