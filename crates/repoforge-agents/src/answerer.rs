//! Grounded answer synthesis with citation validation, confidence
//! calibration, and structural section enforcement (`spec.md` §4.7),
//! grounded on `original_source/backend/app/services/answerer.py`.

use crate::llm_json::{extract_string_field, parse_llm_json, LlmJson};
use futures::stream::BoxStream;
use once_cell::sync::Lazy;
use regex::Regex;
use repoforge_index::Chunk;
use repoforge_providers::{ChatChain, ChatMessage, ChatOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const CONTEXT_SNIPPET_CHARS: usize = 800;
const MAX_CONTEXT_CHUNKS: usize = 3;
const SYNTHESIZED_SNIPPET_CHARS: usize = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub file_path: String,
    pub line_range: String,
    pub why: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: Confidence,
    pub assumptions: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawCitation {
    #[serde(default)]
    file_path: String,
    #[serde(default)]
    line_range: String,
    #[serde(default)]
    why: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawAnswer {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    citations: Vec<RawCitation>,
    #[serde(default)]
    assumptions: Vec<String>,
}

static LINE_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^L(\d+)-L(\d+)$").unwrap());
static UNCERTAINTY_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)i'?m not sure|i do not know|unable to determine|cannot find|no evidence|unclear from the provided").unwrap()
});
static PLACEHOLDER_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(n/a|todo|tbd|lorem ipsum|\.\.\.)$").unwrap());
static LEAKED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*[\{\}\[\]],?\s*$|"(answer|citations|confidence)"\s*:\s*"#).unwrap());

fn chunk_key(chunk: &Chunk) -> (String, String) {
    (
        chunk.file_path.clone(),
        format!("L{}-L{}", chunk.start_line, chunk.end_line),
    )
}

fn build_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .take(MAX_CONTEXT_CHUNKS)
        .enumerate()
        .map(|(i, chunk)| {
            let snippet: String = chunk.content.chars().take(CONTEXT_SNIPPET_CHARS).collect();
            format!(
                "[S{}] {} (L{}-L{})\n{}",
                i + 1,
                chunk.file_path,
                chunk.start_line,
                chunk.end_line,
                snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn empty_chunks_template() -> AnswerResult {
    AnswerResult {
        answer: "## Short Answer\nNo relevant code was retrieved for this question.\n\n\
## Evidence From Code\nNo chunks were available to ground an answer.\n\n\
## Practical Next Step\nTry rephrasing the question or re-index the repository."
            .to_string(),
        citations: Vec::new(),
        confidence: Confidence::Low,
        assumptions: vec!["No chunks were retrieved for this query.".to_string()],
    }
}

const SYSTEM_PROMPT: &str = "You answer questions about a codebase using only the provided \
context snippets labeled [S1], [S2], [S3]. Cite evidence inline like [S1]. Respond with JSON \
only: {\"answer\": \"...\", \"confidence\": \"low|medium|high\", \"citations\": \
[{\"file_path\": \"...\", \"line_range\": \"Lx-Ly\", \"why\": \"...\"}], \"assumptions\": [\"...\"]}.";

const STREAM_SYSTEM_PROMPT: &str =
    "You answer questions about a codebase using only the provided context. Cite as [S1], [S2]. Respond in Markdown only.";

pub async fn answer(
    chat: &ChatChain,
    query: &str,
    chunks: &[Chunk],
    conversation_context: &str,
) -> AnswerResult {
    if chunks.is_empty() {
        return empty_chunks_template();
    }

    let context = build_context(chunks);
    let mut user_content = String::new();
    if !conversation_context.is_empty() {
        user_content.push_str("Conversation so far:\n");
        user_content.push_str(conversation_context);
        user_content.push_str("\n\n");
    }
    user_content.push_str(&format!("Context:\n{context}\n\nQuestion: {query}"));

    let messages = vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_content),
    ];
    let options = ChatOptions::json_mode();

    let raw = match chat.complete(&messages, &options).await {
        Ok(text) => text,
        Err(_) => return empty_chunks_template(),
    };

    let parsed = parse_llm_json::<RawAnswer>(&raw);
    let (mut raw_answer, is_repaired) = match parsed {
        LlmJson::Parsed(r) => (r, false),
        LlmJson::TruncatedRepairable(r) => (r, true),
        LlmJson::Unparsed(text) => {
            let answer_text =
                extract_string_field(&text, "answer").unwrap_or_else(|| text.clone());
            (
                RawAnswer {
                    answer: answer_text,
                    ..Default::default()
                },
                true,
            )
        }
    };

    if raw_answer.answer.trim().is_empty() {
        raw_answer.answer = raw;
    }

    let cleaned = clean_answer_text(&raw_answer.answer);
    let (citations, has_synthetic) = validate_citations(&raw_answer.citations, chunks);
    let confidence = calibrate_confidence(
        &cleaned,
        &citations,
        raw_answer.confidence.as_deref(),
        &raw_answer.assumptions,
        is_repaired,
    );

    let _ = has_synthetic;
    let assumptions = if confidence == Confidence::Low {
        raw_answer.assumptions
    } else {
        Vec::new()
    };

    let answer_text = ensure_structure(&cleaned, &citations, &assumptions);

    AnswerResult {
        answer: answer_text,
        citations,
        confidence,
        assumptions,
    }
}

/// Strips lines that look like leaked JSON key/value fragments from a
/// model response that mixed prose with partial JSON.
fn clean_answer_text(text: &str) -> String {
    text.lines()
        .filter(|line| !LEAKED_JSON.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn validate_citations(raw: &[RawCitation], chunks: &[Chunk]) -> (Vec<Citation>, bool) {
    let known: HashSet<(String, String)> = chunks.iter().map(chunk_key).collect();
    let by_path: std::collections::HashMap<&str, &Chunk> = chunks
        .iter()
        .map(|c| (c.file_path.as_str(), c))
        .collect();

    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for rc in raw {
        if rc.file_path.is_empty() {
            continue;
        }
        let normalized_range = if LINE_RANGE.is_match(&rc.line_range) {
            rc.line_range.to_uppercase()
        } else {
            rc.line_range.clone()
        };
        let key = (rc.file_path.clone(), normalized_range.clone());

        let accepted = if known.contains(&key) {
            Some((rc.file_path.clone(), normalized_range))
        } else if let Some(chunk) = by_path.get(rc.file_path.as_str()) {
            let (path, range) = chunk_key(chunk);
            Some((path, range))
        } else {
            None
        };

        if let Some((file_path, line_range)) = accepted {
            if seen.insert((file_path.clone(), line_range.clone())) {
                out.push(Citation {
                    file_path,
                    line_range,
                    why: rc.why.clone(),
                });
            }
        }
        if out.len() >= MAX_CONTEXT_CHUNKS {
            break;
        }
    }

    if out.is_empty() && !chunks.is_empty() {
        for chunk in chunks.iter().take(MAX_CONTEXT_CHUNKS) {
            let snippet: String = chunk
                .content
                .chars()
                .take(SYNTHESIZED_SNIPPET_CHARS)
                .collect();
            out.push(Citation {
                file_path: chunk.file_path.clone(),
                line_range: format!("L{}-L{}", chunk.start_line, chunk.end_line),
                why: snippet,
            });
        }
        return (out, true);
    }

    (out, false)
}

fn calibrate_confidence(
    answer_text: &str,
    citations: &[Citation],
    llm_confidence: Option<&str>,
    assumptions: &[String],
    is_repaired: bool,
) -> Confidence {
    let unique_citations: HashSet<(&str, &str)> = citations
        .iter()
        .map(|c| (c.file_path.as_str(), c.line_range.as_str()))
        .collect();

    let mut level: i32 = if unique_citations.len() >= 3 {
        2
    } else if unique_citations.len() >= 2 {
        1
    } else {
        0
    };

    if let Some(llm_level) = llm_confidence.map(level_from_str) {
        level = level.min(llm_level);
    }

    if !answer_text.contains("[S") {
        level = level.min(1);
    }

    if !assumptions.is_empty() {
        level -= 1;
    }

    if UNCERTAINTY_MARKERS.is_match(answer_text)
        || PLACEHOLDER_TEXT.is_match(answer_text.trim())
        || is_repaired
    {
        return Confidence::Low;
    }

    match level {
        l if l >= 2 => Confidence::High,
        1 => Confidence::Medium,
        _ => Confidence::Low,
    }
}

fn level_from_str(s: &str) -> i32 {
    match s.to_lowercase().as_str() {
        "high" => 2,
        "medium" => 1,
        _ => 0,
    }
}

const SECTION_HEADERS: [&str; 3] = [
    "## Short Answer",
    "## Evidence From Code",
    "## Practical Next Step",
];

fn ensure_structure(answer: &str, citations: &[Citation], assumptions: &[String]) -> String {
    let normalized = answer.to_lowercase();
    let has_all = SECTION_HEADERS
        .iter()
        .all(|h| normalized.contains(&h.to_lowercase()));
    if has_all {
        return answer.to_string();
    }

    let mut out = String::new();
    if normalized.contains("short answer") {
        out.push_str(answer);
    } else {
        out.push_str("## Short Answer\n");
        out.push_str(answer);
    }
    out.push_str("\n\n");

    if !normalized.contains("evidence from code") {
        out.push_str("## Evidence From Code\n");
        if citations.is_empty() {
            out.push_str("No citations were available.\n");
        } else {
            for c in citations {
                out.push_str(&format!("- {} ({}): {}\n", c.file_path, c.line_range, c.why));
            }
        }
        out.push('\n');
    }

    if !normalized.contains("practical next step") {
        out.push_str("## Practical Next Step\n");
        if assumptions.is_empty() {
            out.push_str("Review the cited code for further detail.\n");
        } else {
            out.push_str("Confirm the following assumptions:\n");
            for a in assumptions {
                out.push_str(&format!("- {a}\n"));
            }
        }
    }

    out.trim_end().to_string()
}

pub async fn answer_stream(
    chat: &ChatChain,
    query: &str,
    chunks: &[Chunk],
    conversation_context: &str,
) -> repoforge_providers::Result<BoxStream<'static, repoforge_providers::Result<String>>> {
    if chunks.is_empty() {
        let text = "No relevant code was retrieved for this question.".to_string();
        return Ok(repoforge_providers::single_chunk_stream(text));
    }

    let context = build_context(chunks);
    let mut user_content = String::new();
    if !conversation_context.is_empty() {
        user_content.push_str("Conversation so far:\n");
        user_content.push_str(conversation_context);
        user_content.push_str("\n\n");
    }
    user_content.push_str(&format!("Context:\n{context}\n\nQuestion: {query}"));

    let messages = vec![
        ChatMessage::system(STREAM_SYSTEM_PROMPT),
        ChatMessage::user(user_content),
    ];
    let options = ChatOptions::default();
    chat.stream(&messages, &options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use repoforge_index::ChunkType;

    fn sample_chunk(path: &str, start: u32, end: u32, content: &str) -> Chunk {
        Chunk {
            chunk_id: format!("{path}-{start}"),
            repo_id: "repo1".to_string(),
            file_path: path.to_string(),
            start_line: start,
            end_line: end,
            language: "rust".to_string(),
            chunk_type: ChunkType::Code,
            token_count: (content.len() / 4).max(1),
            content: content.to_string(),
        }
    }

    #[test]
    fn empty_chunks_yield_low_confidence_template() {
        let result = empty_chunks_template();
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result.answer.contains("## Short Answer"));
    }

    #[test]
    fn validate_citations_accepts_exact_match_and_dedupes() {
        let chunks = vec![sample_chunk("src/lib.rs", 1, 10, "fn main() {}")];
        let raw = vec![
            RawCitation {
                file_path: "src/lib.rs".to_string(),
                line_range: "L1-L10".to_string(),
                why: "entry point".to_string(),
            },
            RawCitation {
                file_path: "src/lib.rs".to_string(),
                line_range: "l1-l10".to_string(),
                why: "dup".to_string(),
            },
        ];
        let (citations, synthetic) = validate_citations(&raw, &chunks);
        assert_eq!(citations.len(), 1);
        assert!(!synthetic);
    }

    #[test]
    fn validate_citations_synthesizes_when_none_valid() {
        let chunks = vec![sample_chunk("src/lib.rs", 1, 10, "fn main() {}")];
        let raw = vec![RawCitation {
            file_path: "src/other.rs".to_string(),
            line_range: "L1-L2".to_string(),
            why: "wrong file".to_string(),
        }];
        let (citations, synthetic) = validate_citations(&raw, &chunks);
        assert_eq!(citations.len(), 1);
        assert!(synthetic);
        assert_eq!(citations[0].file_path, "src/lib.rs");
    }

    #[test]
    fn calibrate_confidence_caps_without_citation_marker() {
        let confidence = calibrate_confidence(
            "This answer has no evidence marker at all.",
            &[
                Citation {
                    file_path: "a".to_string(),
                    line_range: "L1-L2".to_string(),
                    why: "w".to_string(),
                },
                Citation {
                    file_path: "b".to_string(),
                    line_range: "L1-L2".to_string(),
                    why: "w".to_string(),
                },
                Citation {
                    file_path: "c".to_string(),
                    line_range: "L1-L2".to_string(),
                    why: "w".to_string(),
                },
            ],
            Some("high"),
            &[],
            false,
        );
        assert_eq!(confidence, Confidence::Medium);
    }

    #[test]
    fn uncertainty_marker_forces_low() {
        let confidence = calibrate_confidence(
            "I'm not sure [S1] about this.",
            &[
                Citation {
                    file_path: "a".to_string(),
                    line_range: "L1-L2".to_string(),
                    why: "w".to_string(),
                },
                Citation {
                    file_path: "b".to_string(),
                    line_range: "L1-L2".to_string(),
                    why: "w".to_string(),
                },
                Citation {
                    file_path: "c".to_string(),
                    line_range: "L1-L2".to_string(),
                    why: "w".to_string(),
                },
            ],
            Some("high"),
            &[],
            false,
        );
        assert_eq!(confidence, Confidence::Low);
    }

    #[test]
    fn ensure_structure_synthesizes_missing_sections() {
        let out = ensure_structure("Just a plain answer [S1].", &[], &[]);
        for header in SECTION_HEADERS {
            assert!(out.contains(header), "missing {header}");
        }
    }

    #[test]
    fn ensure_structure_leaves_well_formed_answer_untouched() {
        let answer = "## Short Answer\nfoo\n\n## Evidence From Code\nbar\n\n## Practical Next Step\nbaz";
        assert_eq!(ensure_structure(answer, &[], &[]), answer);
    }
}
