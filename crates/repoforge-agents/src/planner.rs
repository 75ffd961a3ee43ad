//! Heuristic + LLM-based query decomposition (`spec.md` §4.6), grounded on
//! `original_source/backend/app/services/planner.py`.

use crate::llm_json::parse_llm_json;
use once_cell::sync::Lazy;
use regex::Regex;
use repoforge_providers::{ChatChain, ChatMessage, ChatOptions};
use serde::Deserialize;
use tracing::warn;

const DECOMPOSE_TOKEN_THRESHOLD: usize = 15;
const DECOMPOSE_MIN_CHARS: usize = 40;

static MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)architecture|flow|end-to-end|across|interaction|dependenc(y|ies)|compare|tradeoff|refactor|security|performance|multi|overview|entire|whole system|full pipeline|walk me through|step by step|trace the|how does .* work together",
    )
    .unwrap()
});

/// Deterministic gate: true for queries that look like they span multiple
/// components or are simply long, false for short queries regardless of
/// marker matches (`spec.md` §4.6).
pub fn should_decompose(query: &str) -> bool {
    if query.len() < DECOMPOSE_MIN_CHARS {
        return false;
    }
    let token_count = query.split_whitespace().count();
    MARKERS.is_match(query) || token_count > DECOMPOSE_TOKEN_THRESHOLD
}

#[derive(Debug, Deserialize)]
struct DecomposeResponse {
    sub_questions: Vec<String>,
}

const SYSTEM_PROMPT: &str = "You break a complex engineering question about a codebase into a \
small set of focused, independently-answerable sub-questions. Respond with JSON only: \
{\"sub_questions\": [\"...\", ...]}.";

/// Returns `None` on LLM failure or unparsable output — callers fall back
/// to treating the original query as a single question.
pub async fn decompose(chat: &ChatChain, query: &str) -> Option<Vec<String>> {
    let messages = vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(query),
    ];
    let options = ChatOptions::json_mode();

    let raw = match chat.complete(&messages, &options).await {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "planner decompose call failed");
            return None;
        }
    };

    match parse_llm_json::<DecomposeResponse>(&raw) {
        crate::llm_json::LlmJson::Parsed(resp) | crate::llm_json::LlmJson::TruncatedRepairable(resp) => {
            if resp.sub_questions.is_empty() {
                None
            } else {
                Some(resp.sub_questions)
            }
        }
        crate::llm_json::LlmJson::Unparsed(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_query_never_decomposes() {
        assert!(!should_decompose("fix bug"));
    }

    #[test]
    fn marker_triggers_decomposition_above_min_length() {
        let query = "Can you explain the overall architecture of this service end to end?";
        assert!(should_decompose(query));
    }

    #[test]
    fn long_query_without_markers_still_decomposes() {
        let query = "what does this function do when given a negative number as input here";
        assert!(query.len() >= DECOMPOSE_MIN_CHARS);
        assert!(should_decompose(query));
    }

    #[test]
    fn long_but_unmarked_short_char_query_is_false() {
        assert!(!should_decompose("short"));
    }
}
