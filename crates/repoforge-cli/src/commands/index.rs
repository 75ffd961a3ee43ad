//! `index` command - build or refresh a registered repository's semantic index.

use anyhow::{Context, Result};
use clap::Args;

use super::build_stack;
use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Repository id returned by `load`.
    repo_id: String,

    /// Reindex even if a cached index for the current commit already exists.
    #[arg(long)]
    force: bool,
}

pub async fn execute(args: IndexArgs, global: GlobalOptions) -> Result<()> {
    let stack = build_stack(&global).await?;

    let outcome = stack
        .indexer
        .index_repo(&args.repo_id, args.force)
        .await
        .context("failed to index repository")?;

    if !outcome.from_cache {
        // Freshly built index means the commit hash moved; drop any cached
        // answers keyed to the old one (`spec.md` §4.12 cache invalidation).
        stack.orchestrator.invalidate_repo(&args.repo_id);
    }

    if global.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "indexed": outcome.indexed,
                "chunk_count": outcome.chunk_count,
                "from_cache": outcome.from_cache,
            }))?
        );
    } else if !global.quiet {
        if outcome.from_cache {
            println!("Index served from cache ({} chunks)", outcome.chunk_count);
        } else {
            println!("Indexed {} chunks", outcome.chunk_count);
        }
    }

    Ok(())
}
