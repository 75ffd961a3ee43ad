//! Generate → test → run → refine feedback loop (`spec.md` §4.13),
//! grounded on `original_source/backend/app/services/refinement_loop.py`.

use crate::generator::{self, GenerationResult};
use crate::llm_json::{parse_llm_json, LlmJson};
use crate::test_generator::{self, TestGenRequest};
use once_cell::sync::Lazy;
use regex::Regex;
use repoforge_index::Retriever;
use repoforge_providers::{ChatChain, ChatMessage, ChatOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

const MAX_ITERATIONS: u32 = 4;
const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(30);
const CODE_TRUNCATE: usize = 2000;
const TESTS_TRUNCATE: usize = 3000;
const FAILURES_TRUNCATE: usize = 2000;
const CLEANUP_RETRIES: u32 = 3;
const CLEANUP_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationLogEntry {
    pub iteration: u32,
    pub passed: bool,
    pub failure_lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementResult {
    pub success: bool,
    pub total_iterations: u32,
    pub final_code: String,
    pub final_tests: String,
    pub iteration_log: Vec<IterationLogEntry>,
    pub final_test_output: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawFix {
    #[serde(default)]
    fix_target: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    fixed_code: String,
    #[serde(default)]
    fixed_tests: String,
}

static FAILURE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"FAILED|ERROR|AssertionError|ModuleNotFoundError|ImportError|SyntaxError").unwrap());

fn extract_failure_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| FAILURE_LINE.is_match(line))
        .map(|line| line.to_string())
        .collect()
}

fn concat_diffs_as_code(generation: &GenerationResult) -> String {
    generation
        .diffs
        .iter()
        .map(|d| {
            let body = if !d.code.is_empty() {
                &d.code
            } else {
                &d.diff
            };
            format!("# File: {}\n{}", d.file_path, body)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn unique_temp_dir_name() -> String {
    let pid = std::process::id();
    let addr = &pid as *const u32 as usize;
    format!("repoforge-refine-{pid}-{addr:x}")
}

async fn run_pytest(dir: &std::path::Path) -> (bool, String) {
    let result = timeout(
        SUBPROCESS_TIMEOUT,
        Command::new("python")
            .args(["-m", "pytest", "-v", "--tb=short", "--no-header"])
            .current_dir(dir)
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            (output.status.success(), combined)
        }
        Ok(Err(err)) => (false, format!("failed to spawn pytest: {err}")),
        Err(_) => (false, "test harness timed out after 30s".to_string()),
    }
}

async fn write_solution_files(dir: &std::path::Path, code: &str, tests: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;

    let mut solution = tokio::fs::File::create(dir.join("solution.py")).await?;
    solution.write_all(code.as_bytes()).await?;

    let prelude = format!(
        "import sys, os\nsys.path.insert(0, os.path.dirname(os.path.abspath(__file__)))\n\n{tests}"
    );
    let mut test_file = tokio::fs::File::create(dir.join("test_solution.py")).await?;
    test_file.write_all(prelude.as_bytes()).await?;
    Ok(())
}

async fn cleanup_temp_dir(dir: &std::path::Path) {
    for attempt in 0..CLEANUP_RETRIES {
        if tokio::fs::remove_dir_all(dir).await.is_ok() {
            return;
        }
        if attempt + 1 < CLEANUP_RETRIES {
            tokio::time::sleep(CLEANUP_RETRY_DELAY).await;
        }
    }
    // Final attempt: ignore errors, matching the best-effort cleanup
    // discipline used elsewhere (`spec.md` §5 temp directories).
    let _ = tokio::fs::remove_dir_all(dir).await;
}

const REFINEMENT_PROMPT: &str = "The following code and tests failed. Diagnose which one is at \
fault and provide a fix. Respond with JSON only: {\"fix_target\": \"code|tests\", \"reasoning\": \
\"...\", \"fixed_code\": \"...\", \"fixed_tests\": \"...\"}.";

async fn request_fix(
    chat: &ChatChain,
    failures: &[String],
    code: &str,
    tests: &str,
) -> Option<RawFix> {
    let failures_text: String = failures.join("\n").chars().take(FAILURES_TRUNCATE).collect();
    let code_text: String = code.chars().take(CODE_TRUNCATE).collect();
    let tests_text: String = tests.chars().take(TESTS_TRUNCATE).collect();

    let messages = vec![
        ChatMessage::system(REFINEMENT_PROMPT),
        ChatMessage::user(format!(
            "Failures:\n{failures_text}\n\nCode:\n{code_text}\n\nTests:\n{tests_text}"
        )),
    ];
    let options = ChatOptions::json_mode();

    let raw = chat.complete(&messages, &options).await.ok()?;
    match parse_llm_json::<RawFix>(&raw) {
        LlmJson::Parsed(fix) | LlmJson::TruncatedRepairable(fix) => Some(fix),
        LlmJson::Unparsed(_) => None,
    }
}

pub async fn refine(
    chat: &ChatChain,
    retriever: &Retriever,
    repo_id: &str,
    request: &str,
) -> RefinementResult {
    let generation = generator::generate(chat, retriever, repo_id, request).await;
    let mut code = concat_diffs_as_code(&generation);

    let test_req = TestGenRequest {
        repo_id: repo_id.to_string(),
        custom_request: Some(code.clone()),
        ..Default::default()
    };
    let test_result = test_generator::generate_tests(chat, retriever, &test_req).await;
    let mut tests = test_result.tests;

    let temp_dir = std::env::temp_dir().join(unique_temp_dir_name());
    let mut iteration_log = Vec::new();
    let mut last_output = String::new();
    let mut success = false;
    let mut iterations_run = 0;

    for iteration in 1..=MAX_ITERATIONS {
        iterations_run = iteration;
        if let Err(err) = write_solution_files(&temp_dir, &code, &tests).await {
            warn!(error = %err, "failed to write refinement scratch files");
            iteration_log.push(IterationLogEntry {
                iteration,
                passed: false,
                failure_lines: vec![format!("io error: {err}")],
            });
            break;
        }

        let (passed, output) = run_pytest(&temp_dir).await;
        last_output = output.clone();
        let failure_lines = extract_failure_lines(&output);
        iteration_log.push(IterationLogEntry {
            iteration,
            passed,
            failure_lines: failure_lines.clone(),
        });

        if passed {
            success = true;
            break;
        }

        match request_fix(chat, &failure_lines, &code, &tests).await {
            Some(fix) => match fix.fix_target.as_str() {
                "tests" => {
                    if !fix.fixed_tests.trim().is_empty() {
                        tests = fix.fixed_tests;
                    }
                }
                _ => {
                    if !fix.fixed_code.trim().is_empty() {
                        code = fix.fixed_code;
                    }
                }
            },
            None => break,
        }
    }

    cleanup_temp_dir(&temp_dir).await;

    RefinementResult {
        success,
        total_iterations: iterations_run,
        final_code: code,
        final_tests: tests,
        iteration_log,
        final_test_output: last_output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_failure_lines_picks_up_known_markers() {
        let output = "test_foo PASSED\ntest_bar FAILED\nAssertionError: boom\n";
        let lines = extract_failure_lines(output);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("FAILED"));
    }

    #[test]
    fn concat_diffs_prefixes_each_file() {
        let generation = GenerationResult {
            diffs: vec![crate::generator::DiffEntry {
                file_path: "solution.py".to_string(),
                where_to_paste: None,
                code: "def f(): pass".to_string(),
                diff: String::new(),
            }],
            ..Default::default()
        };
        let code = concat_diffs_as_code(&generation);
        assert!(code.starts_with("# File: solution.py"));
    }
}
