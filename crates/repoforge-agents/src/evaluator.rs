//! Critic + Defender reviews with Controller verdict and placeholder
//! rejection (`spec.md` §4.10), grounded on
//! `original_source/backend/app/services/evaluator.py`.

use crate::generator::DiffEntry;
use crate::llm_json::{parse_llm_json, LlmJson};
use repoforge_providers::{ChatChain, ChatMessage, ChatOptions, ChatProviderKind};
use serde::{Deserialize, Serialize};

const PER_FILE_CHAR_LIMIT: usize = 2_200;
const TOTAL_BUNDLE_CHAR_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    AcceptOriginal,
    MergeFeedback,
    RequestRevision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerVerdict {
    pub score: f32,
    pub issues: Vec<String>,
    pub feedback: String,
    pub suggested_changes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawReviewer {
    #[serde(default)]
    score: f32,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    suggested_changes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovedFile {
    pub file_path: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerVerdict {
    pub decision: Decision,
    pub reasoning: String,
    pub final_score: f32,
    pub confidence: f32,
    pub merged_issues: Vec<String>,
    pub priority_fixes: Vec<String>,
    pub improved_code_by_file: Vec<ImprovedFile>,
}

#[derive(Debug, Deserialize, Default)]
struct RawController {
    #[serde(default)]
    decision: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    final_score: f32,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    merged_issues: Vec<String>,
    #[serde(default)]
    priority_fixes: Vec<String>,
    #[serde(default)]
    improved_code_by_file: Vec<ImprovedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub enabled: bool,
    pub critic: Option<ReviewerVerdict>,
    pub defender: Option<ReviewerVerdict>,
    pub controller: ControllerVerdict,
}

fn stub_request_revision(reasoning: &str) -> EvaluationResult {
    EvaluationResult {
        enabled: false,
        critic: None,
        defender: None,
        controller: ControllerVerdict {
            decision: Decision::RequestRevision,
            reasoning: reasoning.to_string(),
            final_score: 0.0,
            confidence: 0.0,
            merged_issues: Vec::new(),
            priority_fixes: Vec::new(),
            improved_code_by_file: Vec::new(),
        },
    }
}

fn build_code_bundle(diffs: &[DiffEntry]) -> String {
    let mut bundle = String::new();
    for diff in diffs {
        let body = if diff.code.is_empty() { &diff.diff } else { &diff.code };
        if body.is_empty() {
            continue;
        }
        let truncated: String = body.chars().take(PER_FILE_CHAR_LIMIT).collect();
        bundle.push_str(&format!("File: {}\n{}\n\n", diff.file_path, truncated));
        if bundle.len() >= TOTAL_BUNDLE_CHAR_LIMIT {
            break;
        }
    }
    bundle.chars().take(TOTAL_BUNDLE_CHAR_LIMIT).collect()
}

const REVIEWER_PROMPT: &str = "You review a proposed code change. Respond with JSON only: \
{\"score\": 0-10, \"issues\": [\"...\"], \"feedback\": \"...\", \"suggested_changes\": [\"...\"]}.";

async fn run_reviewer(
    chat: &ChatChain,
    tier: ChatProviderKind,
    request_text: &str,
    bundle: &str,
) -> Option<ReviewerVerdict> {
    let messages = vec![
        ChatMessage::system(REVIEWER_PROMPT),
        ChatMessage::user(format!("Request: {request_text}\n\nCode:\n{bundle}")),
    ];
    let options = ChatOptions::json_mode().with_override(tier);

    let raw = chat.complete(&messages, &options).await.ok()?;
    match parse_llm_json::<RawReviewer>(&raw) {
        LlmJson::Parsed(r) | LlmJson::TruncatedRepairable(r) => Some(ReviewerVerdict {
            score: r.score.clamp(0.0, 10.0),
            issues: r.issues,
            feedback: r.feedback,
            suggested_changes: r.suggested_changes,
        }),
        LlmJson::Unparsed(_) => None,
    }
}

const PLACEHOLDER_CODE_PHRASES: [&str; 4] = [
    "no changes needed",
    "same as original",
    "n/a",
    "todo",
];
const CODE_LIKE_MARKERS: [&str; 8] = ["{", "(", "=", ";", "def ", "class ", "import ", "#include"];

fn is_valid_improved_code(code: &str) -> bool {
    let trimmed = code.trim();
    if trimmed.len() < 20 {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if PLACEHOLDER_CODE_PHRASES.iter().any(|p| lower == *p) {
        return false;
    }
    CODE_LIKE_MARKERS.iter().any(|marker| trimmed.contains(marker))
}

fn normalize_decision(raw: &str) -> Decision {
    let upper = raw.to_uppercase();
    if upper.starts_with("ACCEPT") {
        Decision::AcceptOriginal
    } else if upper.starts_with("MERGE") || upper.starts_with("FEEDBACK") {
        Decision::MergeFeedback
    } else if upper.starts_with("REVIS") || upper.starts_with("REJECT") {
        Decision::RequestRevision
    } else {
        Decision::MergeFeedback
    }
}

const CONTROLLER_PROMPT: &str = "You are the controller arbitrating between a critic and a \
defender review of a proposed code change. Respond with JSON only: {\"decision\": \
\"ACCEPT_ORIGINAL|MERGE_FEEDBACK|REQUEST_REVISION\", \"reasoning\": \"...\", \"final_score\": \
0-10, \"confidence\": 0-1, \"merged_issues\": [\"...\"], \"priority_fixes\": [\"...\"], \
\"improved_code_by_file\": [{\"file_path\": \"...\", \"code\": \"...\"}]}.";

async fn run_controller(
    chat: &ChatChain,
    request_text: &str,
    bundle: &str,
    critic: &Option<ReviewerVerdict>,
    defender: &Option<ReviewerVerdict>,
) -> Option<ControllerVerdict> {
    let critic_json = serde_json::to_string(critic).ok()?;
    let defender_json = serde_json::to_string(defender).ok()?;
    let messages = vec![
        ChatMessage::system(CONTROLLER_PROMPT),
        ChatMessage::user(format!(
            "Request: {request_text}\n\nCode:\n{bundle}\n\nCritic: {critic_json}\n\nDefender: {defender_json}"
        )),
    ];
    let options = ChatOptions::json_mode();
    let raw = chat.complete(&messages, &options).await.ok()?;

    let parsed = match parse_llm_json::<RawController>(&raw) {
        LlmJson::Parsed(r) | LlmJson::TruncatedRepairable(r) => r,
        LlmJson::Unparsed(_) => return None,
    };

    let mut improved = parsed.improved_code_by_file;
    improved.retain(|f| is_valid_improved_code(&f.code));

    let mut decision = normalize_decision(&parsed.decision);
    if decision == Decision::MergeFeedback && improved.is_empty() {
        decision = Decision::AcceptOriginal;
    }

    Some(ControllerVerdict {
        decision,
        reasoning: parsed.reasoning,
        final_score: parsed.final_score.clamp(0.0, 10.0),
        confidence: parsed.confidence.clamp(0.0, 1.0),
        merged_issues: parsed.merged_issues,
        priority_fixes: parsed.priority_fixes,
        improved_code_by_file: improved,
    })
}

/// Used when the controller call itself fails — derives a verdict from
/// whichever reviewer scores are available (`spec.md` §4.10 step 7).
fn controller_fallback(
    critic: &Option<ReviewerVerdict>,
    defender: &Option<ReviewerVerdict>,
) -> ControllerVerdict {
    let scores: Vec<f32> = [critic, defender]
        .iter()
        .filter_map(|r| r.as_ref().map(|v| v.score))
        .collect();
    let final_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f32>() / scores.len() as f32
    };

    let decision = if final_score >= 8.0 {
        Decision::AcceptOriginal
    } else if final_score >= 5.0 {
        Decision::MergeFeedback
    } else {
        Decision::RequestRevision
    };

    let mut merged_issues = Vec::new();
    if let Some(c) = critic {
        merged_issues.extend(c.issues.iter().map(|i| format!("[critic] {i}")));
    }
    if let Some(d) = defender {
        merged_issues.extend(d.issues.iter().map(|i| format!("[defender] {i}")));
    }

    let confidence = match scores.len() {
        2 => 0.85,
        1 => 0.6,
        _ => 0.2,
    };

    ControllerVerdict {
        decision,
        reasoning: "controller call failed; falling back to reviewer-score heuristic".to_string(),
        final_score,
        confidence,
        merged_issues,
        priority_fixes: Vec::new(),
        improved_code_by_file: Vec::new(),
    }
}

pub async fn evaluate_generation(
    chat: &ChatChain,
    request_text: &str,
    generated_diffs: &[DiffEntry],
) -> EvaluationResult {
    let bundle = build_code_bundle(generated_diffs);
    if bundle.is_empty() {
        return stub_request_revision("no generated code to evaluate");
    }

    let (critic, defender) = tokio::join!(
        run_reviewer(chat, ChatProviderKind::LocalA, request_text, &bundle),
        run_reviewer(chat, ChatProviderKind::LocalB, request_text, &bundle),
    );

    let controller = match run_controller(chat, request_text, &bundle, &critic, &defender).await {
        Some(verdict) => verdict,
        None => controller_fallback(&critic, &defender),
    };

    EvaluationResult {
        enabled: true,
        critic,
        defender,
        controller,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bundle_yields_request_revision_stub() {
        let result = build_code_bundle(&[]);
        assert!(result.is_empty());
    }

    #[test]
    fn normalize_decision_handles_variants() {
        assert_eq!(normalize_decision("accept"), Decision::AcceptOriginal);
        assert_eq!(normalize_decision("merge_feedback"), Decision::MergeFeedback);
        assert_eq!(normalize_decision("feedback_needed"), Decision::MergeFeedback);
        assert_eq!(normalize_decision("revision_required"), Decision::RequestRevision);
        assert_eq!(normalize_decision("reject"), Decision::RequestRevision);
        assert_eq!(normalize_decision("something_else"), Decision::MergeFeedback);
    }

    #[test]
    fn improved_code_rejects_placeholder_and_short_strings() {
        assert!(!is_valid_improved_code("n/a"));
        assert!(!is_valid_improved_code("short"));
        assert!(is_valid_improved_code("def f():\n    return 1\n"));
    }

    #[test]
    fn controller_fallback_maps_high_scores_to_accept() {
        let critic = Some(ReviewerVerdict {
            score: 9.0,
            issues: vec![],
            feedback: "good".to_string(),
            suggested_changes: vec![],
        });
        let verdict = controller_fallback(&critic, &None);
        assert_eq!(verdict.decision, Decision::AcceptOriginal);
        assert_eq!(verdict.confidence, 0.6);
    }

    #[test]
    fn controller_fallback_maps_low_scores_to_request_revision() {
        let critic = Some(ReviewerVerdict {
            score: 2.0,
            issues: vec!["broken".to_string()],
            feedback: "bad".to_string(),
            suggested_changes: vec![],
        });
        let defender = Some(ReviewerVerdict {
            score: 3.0,
            issues: vec![],
            feedback: "meh".to_string(),
            suggested_changes: vec![],
        });
        let verdict = controller_fallback(&critic, &defender);
        assert_eq!(verdict.decision, Decision::RequestRevision);
        assert_eq!(verdict.confidence, 0.85);
    }
}
