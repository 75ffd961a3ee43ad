//! Sum-typed recovery for untrusted LLM JSON (`spec.md` §9), grounded in
//! `original_source/backend/app/services/answerer.py::_parse_response`
//! and `generator.py`'s truncation-repair path.
//!
//! Every consumer must handle all three variants; none may assume valid
//! JSON reached this layer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, PartialEq)]
pub enum LlmJson<T> {
    /// Parsed on the first attempt, or after stripping fences/brace-wrapping.
    Parsed(T),
    /// Only parsed after brace/bracket/quote-balancing repair — likely
    /// truncated by a token limit. Callers should treat this as lower
    /// confidence than `Parsed`.
    TruncatedRepairable(T),
    /// Could not be coerced into valid JSON at all; carries the raw text
    /// for regex-field-extraction fallbacks.
    Unparsed(String),
}

impl<T> LlmJson<T> {
    pub fn value(self) -> Option<T> {
        match self {
            LlmJson::Parsed(v) | LlmJson::TruncatedRepairable(v) => Some(v),
            LlmJson::Unparsed(_) => None,
        }
    }

    pub fn as_ref(&self) -> LlmJson<&T> {
        match self {
            LlmJson::Parsed(v) => LlmJson::Parsed(v),
            LlmJson::TruncatedRepairable(v) => LlmJson::TruncatedRepairable(v),
            LlmJson::Unparsed(s) => LlmJson::Unparsed(s.clone()),
        }
    }
}

static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());

fn strip_fence(raw: &str) -> Option<String> {
    FENCE.captures(raw).map(|c| c[1].trim().to_string())
}

fn brace_wrapped(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end > start {
        Some(raw[start..=end].to_string())
    } else {
        None
    }
}

/// Balances unterminated braces/brackets/quotes in a truncated blob —
/// best-effort, intended only as a last resort before giving up.
fn repair_truncated(raw: &str) -> String {
    let mut out = raw.trim().to_string();
    let mut in_string = false;
    let mut escape = false;
    let mut stack = Vec::new();

    for c in out.chars() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                stack.pop();
            }
            _ => {}
        }
    }

    if in_string {
        out.push('"');
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

/// Attempts, in order: direct parse, fence-stripped parse, brace-wrapped
/// parse, then truncation-repair parse. Falls back to `Unparsed`.
pub fn parse_llm_json<T: DeserializeOwned>(raw: &str) -> LlmJson<T> {
    let trimmed = raw.trim();

    if let Ok(v) = serde_json::from_str::<T>(trimmed) {
        return LlmJson::Parsed(v);
    }
    if let Some(fenced) = strip_fence(trimmed) {
        if let Ok(v) = serde_json::from_str::<T>(&fenced) {
            return LlmJson::Parsed(v);
        }
        if let Some(wrapped) = brace_wrapped(&fenced) {
            if let Ok(v) = serde_json::from_str::<T>(&wrapped) {
                return LlmJson::Parsed(v);
            }
        }
    }
    if let Some(wrapped) = brace_wrapped(trimmed) {
        if let Ok(v) = serde_json::from_str::<T>(&wrapped) {
            return LlmJson::Parsed(v);
        }
        let repaired = repair_truncated(&wrapped);
        if let Ok(v) = serde_json::from_str::<T>(&repaired) {
            return LlmJson::TruncatedRepairable(v);
        }
    }

    LlmJson::Unparsed(raw.to_string())
}

/// Regex field-extraction fallback for a single string field, e.g.
/// pulling `"answer": "..."` out of text that never became valid JSON.
pub fn extract_string_field(raw: &str, field: &str) -> Option<String> {
    let pattern = format!(r#""{field}"\s*:\s*"((?:[^"\\]|\\.)*)""#);
    let re = Regex::new(&pattern).ok()?;
    re.captures(raw).map(|c| {
        c[1].replace("\\n", "\n")
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        answer: String,
    }

    #[test]
    fn parses_clean_json_directly() {
        let result = parse_llm_json::<Sample>(r#"{"answer": "hi"}"#);
        assert_eq!(
            result,
            LlmJson::Parsed(Sample {
                answer: "hi".into()
            })
        );
    }

    #[test]
    fn strips_markdown_fence() {
        let raw = "```json\n{\"answer\": \"hi\"}\n```";
        let result = parse_llm_json::<Sample>(raw);
        assert_eq!(
            result,
            LlmJson::Parsed(Sample {
                answer: "hi".into()
            })
        );
    }

    #[test]
    fn brace_wraps_surrounding_prose() {
        let raw = "Sure, here you go: {\"answer\": \"hi\"} Hope that helps.";
        let result = parse_llm_json::<Sample>(raw);
        assert_eq!(
            result,
            LlmJson::Parsed(Sample {
                answer: "hi".into()
            })
        );
    }

    #[test]
    fn repairs_truncated_json() {
        let raw = r#"{"answer": "hi"#;
        let result = parse_llm_json::<Sample>(raw);
        assert_eq!(
            result,
            LlmJson::TruncatedRepairable(Sample {
                answer: "hi".into()
            })
        );
    }

    #[test]
    fn falls_back_to_unparsed() {
        let raw = "not json at all";
        let result: LlmJson<Sample> = parse_llm_json(raw);
        assert_eq!(result, LlmJson::Unparsed(raw.to_string()));
    }

    #[test]
    fn extracts_field_via_regex_fallback() {
        let raw = r#"garbage prefix "answer": "the real answer" garbage suffix"#;
        assert_eq!(
            extract_string_field(raw, "answer"),
            Some("the real answer".to_string())
        );
    }
}
