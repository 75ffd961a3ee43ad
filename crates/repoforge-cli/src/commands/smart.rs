//! `smart` command - the full router -> agents -> evaluator pipeline.

use anyhow::Result;
use clap::Args;

use super::build_stack;
use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct SmartArgs {
    /// Repository id returned by `load`.
    repo_id: String,

    /// The request to route and fulfill.
    request: String,
}

pub async fn execute(args: SmartArgs, global: GlobalOptions) -> Result<()> {
    let stack = build_stack(&global).await?;

    let result = stack.orchestrator.smart(&args.repo_id, &args.request).await;

    if global.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "Routed to: {:?} (agents used: {})",
        result.routing.primary_action,
        result.agents_used.join(", ")
    );
    if let Some(answer) = &result.answer {
        println!("\n{answer}");
    }
    if let Some(evaluation_action) = &result.evaluation_action {
        println!("\nEvaluator decision: {evaluation_action:?}");
    }
    if result.from_cache && !global.quiet {
        println!("\n(served from cache)");
    }

    Ok(())
}
