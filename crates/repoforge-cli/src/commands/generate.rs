//! `generate` command - propose a code change grounded in retrieved context.

use anyhow::Result;
use clap::Args;

use super::build_stack;
use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Repository id returned by `load`.
    repo_id: String,

    /// What to build, e.g. "add a binary search tree".
    request: String,
}

pub async fn execute(args: GenerateArgs, global: GlobalOptions) -> Result<()> {
    let stack = build_stack(&global).await?;

    let result = repoforge_agents::generate(&stack.chat, &stack.retriever, &args.repo_id, &args.request).await;

    if global.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Plan: {}", result.plan);
    for diff in &result.diffs {
        println!("\n--- {} ---", diff.file_path);
        println!("{}", diff.code);
        if let Some(instruction) = &diff.where_to_paste {
            println!("  ({instruction})");
        }
    }
    if !result.tests.is_empty() {
        println!("\n--- tests ---\n{}", result.tests);
    }

    Ok(())
}
