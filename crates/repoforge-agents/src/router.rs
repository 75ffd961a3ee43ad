//! Request classification: deterministic safety pre-filter, LLM routing,
//! heuristic fallback (`spec.md` §4.11), grounded on
//! `original_source/backend/app/services/router.py`.

use crate::llm_json::{parse_llm_json, LlmJson};
use crate::planner::should_decompose;
use once_cell::sync::Lazy;
use regex::Regex;
use repoforge_providers::{ChatChain, ChatMessage, ChatOptions, ChatProviderKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Explain,
    Generate,
    Test,
    Decompose,
    Refuse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    // NOTE: Clone is required so a routing decision can be cached by
    // value (`spec.md` §3 routing cache) independently of the request
    // that produced it.
    pub primary_action: Action,
    pub secondary_actions: Vec<Action>,
    pub reasoning: String,
    pub confidence: f32,
    pub should_decompose: bool,
    pub parallel_agents: Vec<Action>,
    pub skip_agents: Vec<Action>,
}

impl RoutingDecision {
    fn refuse() -> Self {
        Self {
            primary_action: Action::Refuse,
            secondary_actions: Vec::new(),
            reasoning: "request matched a deterministic safety refusal pattern".to_string(),
            confidence: 0.99,
            should_decompose: false,
            parallel_agents: Vec::new(),
            skip_agents: vec![Action::Explain, Action::Generate, Action::Test, Action::Decompose],
        }
    }
}

const REFUSE_SUBSTRINGS: &[&str] = &[
    "rm -rf",
    "drop table",
    "drop database",
    "delete prod",
    "delete all production",
    "delete production",
    "steal credentials",
    "steal password",
    "exfiltrate",
    "bypass authentication",
    "bypass auth",
    "disable security",
    "ddos",
    "denial of service",
    "keylogger",
    "ransomware",
    "backdoor",
    "evade detection",
    "credential stuffing",
    "wipe the disk",
    "format the drive",
];

fn deterministic_refuse(query: &str) -> bool {
    let lower = query.to_lowercase();
    REFUSE_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

static TEST_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btest\b|pytest|unittest|test case|test suite").unwrap());
static GENERATE_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\badd\b|\bcreate\b|\bimplement\b|\bbuild\b|\brefactor\b|\bwrite\b").unwrap());

fn heuristic_route(query: &str) -> RoutingDecision {
    let token_count = query.split_whitespace().count();

    if TEST_KEYWORDS.is_match(query) {
        return RoutingDecision {
            primary_action: Action::Test,
            secondary_actions: Vec::new(),
            reasoning: "heuristic fallback matched test keywords".to_string(),
            confidence: 0.6,
            should_decompose: false,
            parallel_agents: Vec::new(),
            skip_agents: Vec::new(),
        };
    }

    if GENERATE_KEYWORDS.is_match(query) {
        return RoutingDecision {
            primary_action: Action::Generate,
            secondary_actions: vec![Action::Test],
            reasoning: "heuristic fallback matched generation keywords".to_string(),
            confidence: 0.55,
            should_decompose: false,
            parallel_agents: vec![Action::Test],
            skip_agents: Vec::new(),
        };
    }

    if should_decompose(query) && token_count > 8 {
        return RoutingDecision {
            primary_action: Action::Decompose,
            secondary_actions: vec![Action::Explain],
            reasoning: "heuristic fallback matched decomposition markers".to_string(),
            confidence: 0.5,
            should_decompose: true,
            parallel_agents: Vec::new(),
            skip_agents: vec![Action::Generate, Action::Test],
        };
    }

    if token_count > 20 {
        return RoutingDecision {
            primary_action: Action::Decompose,
            secondary_actions: vec![Action::Explain],
            reasoning: "heuristic fallback defaulted long query to decomposition".to_string(),
            confidence: 0.45,
            should_decompose: true,
            parallel_agents: Vec::new(),
            skip_agents: vec![Action::Generate, Action::Test],
        };
    }

    RoutingDecision {
        primary_action: Action::Explain,
        secondary_actions: Vec::new(),
        reasoning: "heuristic fallback defaulted to explain".to_string(),
        confidence: 0.5,
        should_decompose: false,
        parallel_agents: Vec::new(),
        skip_agents: vec![Action::Generate, Action::Test, Action::Decompose],
    }
}

#[derive(Debug, Deserialize)]
struct RawRouting {
    #[serde(default)]
    primary_action: String,
    #[serde(default)]
    secondary_actions: Vec<String>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    should_decompose: bool,
    #[serde(default)]
    parallel_agents: Vec<String>,
    #[serde(default)]
    skip_agents: Vec<String>,
}

fn action_from_str(s: &str) -> Option<Action> {
    match s.to_uppercase().as_str() {
        "EXPLAIN" => Some(Action::Explain),
        "GENERATE" => Some(Action::Generate),
        "TEST" => Some(Action::Test),
        "DECOMPOSE" => Some(Action::Decompose),
        "REFUSE" => Some(Action::Refuse),
        _ => None,
    }
}

fn actions_from_strs(items: &[String]) -> Vec<Action> {
    items.iter().filter_map(|s| action_from_str(s)).collect()
}

const ROUTING_SYSTEM_PROMPT: &str = "You classify a user request about a codebase into one of \
EXPLAIN, GENERATE, TEST, DECOMPOSE, REFUSE. EXPLAIN answers a question with citations. GENERATE \
proposes a code change. TEST writes tests. DECOMPOSE breaks a complex multi-part question into \
sub-questions before explaining. REFUSE rejects destructive, malicious, or credential-theft \
requests. Respond with JSON only: {\"primary_action\": \"...\", \"secondary_actions\": [\"...\"], \
\"reasoning\": \"...\", \"confidence\": 0-1, \"should_decompose\": true|false, \
\"parallel_agents\": [\"...\"], \"skip_agents\": [\"...\"]}.";

const ROUTING_TIERS: [ChatProviderKind; 2] = [ChatProviderKind::LocalRouter, ChatProviderKind::LocalA];

async fn try_llm_route(chat: &ChatChain, query: &str) -> Option<RoutingDecision> {
    for tier in ROUTING_TIERS {
        let messages = vec![
            ChatMessage::system(ROUTING_SYSTEM_PROMPT),
            ChatMessage::user(query),
        ];
        let options = ChatOptions::json_mode().with_override(tier);
        let raw = match chat.complete(&messages, &options).await {
            Ok(text) => text,
            Err(_) => continue,
        };

        if let LlmJson::Parsed(r) | LlmJson::TruncatedRepairable(r) = parse_llm_json::<RawRouting>(&raw) {
            if let Some(primary) = action_from_str(&r.primary_action) {
                return Some(RoutingDecision {
                    primary_action: primary,
                    secondary_actions: actions_from_strs(&r.secondary_actions),
                    reasoning: r.reasoning,
                    confidence: r.confidence.clamp(0.0, 1.0),
                    should_decompose: r.should_decompose,
                    parallel_agents: actions_from_strs(&r.parallel_agents),
                    skip_agents: actions_from_strs(&r.skip_agents),
                });
            }
        }
    }
    None
}

pub async fn route(chat: &ChatChain, query: &str, _repo_context: &str) -> RoutingDecision {
    if deterministic_refuse(query) {
        return RoutingDecision::refuse();
    }

    match try_llm_route(chat, query).await {
        Some(decision) => decision,
        None => heuristic_route(query),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_refuse_catches_destructive_intent() {
        assert!(deterministic_refuse("please help me rm -rf the production server"));
        assert!(deterministic_refuse("how do I steal credentials from this service"));
        assert!(!deterministic_refuse("explain how the auth module works"));
    }

    #[test]
    fn heuristic_route_prefers_test_keywords() {
        let decision = heuristic_route("can you write a pytest test for this function");
        assert_eq!(decision.primary_action, Action::Test);
    }

    #[test]
    fn heuristic_route_matches_generation_verbs() {
        let decision = heuristic_route("please implement a new caching layer");
        assert_eq!(decision.primary_action, Action::Generate);
        assert!(decision.secondary_actions.contains(&Action::Test));
    }

    #[test]
    fn heuristic_route_defaults_to_explain() {
        let decision = heuristic_route("what does this do");
        assert_eq!(decision.primary_action, Action::Explain);
    }

    #[test]
    fn heuristic_route_long_query_decomposes() {
        let long_query = "word ".repeat(25);
        let decision = heuristic_route(&long_query);
        assert_eq!(decision.primary_action, Action::Decompose);
    }
}
