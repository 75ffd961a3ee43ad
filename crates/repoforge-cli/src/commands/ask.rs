//! `ask` command - direct grounded Q&A, bypassing the router.

use anyhow::Result;
use clap::Args;

use super::build_stack;
use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Repository id returned by `load`.
    repo_id: String,

    /// The question to answer.
    question: String,

    /// Number of chunks to retrieve as context.
    #[arg(long, short = 'k')]
    k: Option<usize>,
}

pub async fn execute(args: AskArgs, global: GlobalOptions) -> Result<()> {
    let stack = build_stack(&global).await?;

    let k = args.k.unwrap_or(repoforge_index::DEFAULT_K);
    let chunks = stack
        .retriever
        .retrieve(&args.repo_id, &args.question, k)
        .await
        .unwrap_or_default();

    let result = repoforge_agents::answer(&stack.chat, &args.question, &chunks, "").await;

    if global.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.answer);
        if !result.citations.is_empty() {
            println!("\nCitations:");
            for citation in &result.citations {
                println!("  {} ({})", citation.file_path, citation.line_range);
            }
        }
        if !global.quiet {
            println!("\nConfidence: {:?}", result.confidence);
        }
    }

    Ok(())
}
