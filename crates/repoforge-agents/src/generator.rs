//! Code-change proposal with language detection, algorithm-hint
//! injection, and post-processing (`spec.md` §4.8), grounded on
//! `original_source/backend/app/services/generator.py`.

use crate::llm_json::{extract_string_field, parse_llm_json, LlmJson};
use crate::planner::should_decompose;
use once_cell::sync::Lazy;
use regex::Regex;
use repoforge_index::{Chunk, Retriever};
use repoforge_providers::{ChatChain, ChatMessage, ChatOptions};
use serde::{Deserialize, Serialize};

const COMPLEX_K: usize = 4;
const SIMPLE_K: usize = 3;
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffEntry {
    pub file_path: String,
    pub where_to_paste: Option<String>,
    pub code: String,
    pub diff: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationResult {
    pub plan: String,
    pub patterns_followed: Vec<String>,
    pub diffs: Vec<DiffEntry>,
    pub tests: String,
    pub citations: Vec<String>,
    pub paste_instructions: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawChange {
    #[serde(default)]
    file_path: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    diff: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawGeneration {
    #[serde(default)]
    plan: String,
    #[serde(default)]
    changes: Vec<RawChange>,
    #[serde(default)]
    test_file_content: String,
    #[serde(default)]
    patterns_followed: Vec<String>,
}

/// Well-known algorithms/data structures, longest-match first so e.g.
/// "binary search tree" wins over "binary search".
static ALGORITHM_TABLE: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    let mut table = vec![
        ("binary search tree", "binary_search_tree"),
        ("merge sort", "merge_sort"),
        ("quick sort", "quick_sort"),
        ("bubble sort", "bubble_sort"),
        ("insertion sort", "insertion_sort"),
        ("binary search", "binary_search"),
        ("linked list", "linked_list"),
        ("hash map", "hash_map"),
        ("hash table", "hash_table"),
        ("depth first search", "depth_first_search"),
        ("breadth first search", "breadth_first_search"),
        ("dijkstra", "dijkstra"),
        ("dynamic programming", "dynamic_programming"),
        ("red black tree", "red_black_tree"),
        ("trie", "trie"),
        ("heap sort", "heap_sort"),
    ];
    table.sort_by_key(|(phrase, _)| std::cmp::Reverse(phrase.len()));
    table
});

fn detect_algorithm_hint(request: &str) -> Option<&'static str> {
    let lower = request.to_lowercase();
    ALGORITHM_TABLE
        .iter()
        .find(|(phrase, _)| lower.contains(phrase))
        .map(|(_, slug)| *slug)
}

static LANGUAGE_EXTENSIONS: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("python", ".py"),
        ("rust", ".rs"),
        ("javascript", ".js"),
        ("typescript", ".ts"),
        ("java", ".java"),
        ("go", ".go"),
        ("c++", ".cpp"),
        ("cpp", ".cpp"),
        ("c#", ".cs"),
        ("ruby", ".rb"),
    ]
});

fn detect_target_extension(request: &str) -> &'static str {
    let lower = request.to_lowercase();
    LANGUAGE_EXTENSIONS
        .iter()
        .find(|(lang, _)| lower.contains(lang))
        .map(|(_, ext)| *ext)
        .unwrap_or(".py")
}

static COMPLEXITY_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)multiple files|migration|integration|architecture|across|refactor").unwrap()
});

fn is_complex(request: &str) -> bool {
    COMPLEXITY_MARKERS.is_match(request) || should_decompose(request)
}

const CPP_EXTENSIONS: [&str; 6] = [".cpp", ".cc", ".cxx", ".c++", ".hpp", ".h"];

const PLACEHOLDER_TEST_STRINGS: [&str; 6] = [
    "test code here",
    "n/a",
    "todo",
    "tbd",
    "placeholder",
    "no tests generated",
];

static FENCE_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[a-zA-Z]*\n?|```").unwrap());

fn strip_fences(s: &str) -> String {
    FENCE_STRIP.replace_all(s, "").trim().to_string()
}

const SYSTEM_PROMPT_BASE: &str = "You are a senior engineer proposing a code change for this \
repository. Ground every change in the retrieved context. Respond with JSON only: \
{\"plan\": \"...\", \"changes\": [{\"file_path\": \"...\", \"code\": \"...\", \"diff\": \"...\"}], \
\"test_file_content\": \"...\", \"patterns_followed\": [\"...\"]}.";

pub async fn generate(
    chat: &ChatChain,
    retriever: &Retriever,
    repo_id: &str,
    request: &str,
) -> GenerationResult {
    match generate_inner(chat, retriever, repo_id, request).await {
        Ok(result) => result,
        Err(err) => GenerationResult {
            plan: format!("Generation failed: {err}"),
            ..Default::default()
        },
    }
}

async fn generate_inner(
    chat: &ChatChain,
    retriever: &Retriever,
    repo_id: &str,
    request: &str,
) -> Result<GenerationResult, String> {
    let k = if is_complex(request) { COMPLEX_K } else { SIMPLE_K };
    let chunks = retriever
        .retrieve(repo_id, request, k)
        .await
        .map_err(|e| e.to_string())?;

    let algorithm_hint = detect_algorithm_hint(request);
    let extension = detect_target_extension(request);

    let context = chunks
        .iter()
        .map(|c| format!("{} (L{}-L{})\n{}", c.file_path, c.start_line, c.end_line, c.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut user_content = format!("Context:\n{context}\n\nRequest: {request}");
    if let Some(algo) = algorithm_hint {
        user_content.push_str(&format!(
            "\n\nCRITICAL INSTRUCTION: implement exactly the {algo} algorithm/data structure. \
Treat the retrieved context as reference only, not as the thing to implement. Name the primary \
file `{algo}{extension}`."
        ));
    }

    let messages = vec![
        ChatMessage::system(SYSTEM_PROMPT_BASE),
        ChatMessage::user(user_content),
    ];
    let options = ChatOptions::json_mode().with_max_tokens(MAX_TOKENS);

    let raw = chat
        .complete(&messages, &options)
        .await
        .map_err(|e| e.to_string())?;

    let raw_generation = match parse_llm_json::<RawGeneration>(&raw) {
        LlmJson::Parsed(r) | LlmJson::TruncatedRepairable(r) => r,
        LlmJson::Unparsed(text) => RawGeneration {
            plan: extract_string_field(&text, "plan").unwrap_or_default(),
            ..Default::default()
        },
    };

    let mut diffs: Vec<DiffEntry> = raw_generation
        .changes
        .into_iter()
        .map(|change| post_process_change(change, algorithm_hint, extension))
        .collect();

    let citations: Vec<String> = chunks.iter().map(|c| c.file_path.clone()).collect();
    let paste_instructions = derive_paste_instructions(&diffs);

    let tests = validate_tests(&raw_generation.test_file_content);

    // Fold paste instructions back onto diffs lacking one.
    for (diff, instruction) in diffs.iter_mut().zip(paste_instructions.iter()) {
        if diff.where_to_paste.is_none() {
            diff.where_to_paste = Some(instruction.clone());
        }
    }

    Ok(GenerationResult {
        plan: raw_generation.plan,
        patterns_followed: raw_generation.patterns_followed,
        diffs,
        tests,
        citations,
        paste_instructions,
    })
}

fn post_process_change(
    change: RawChange,
    algorithm_hint: Option<&'static str>,
    extension: &'static str,
) -> DiffEntry {
    let mut code = strip_fences(&change.code);
    let diff = strip_fences(&change.diff);
    if code.is_empty() && !diff.is_empty() {
        code = diff.clone();
    }

    let mut file_path = change.file_path;
    if let Some(algo) = algorithm_hint {
        if !file_path.contains(algo) {
            file_path = format!("{algo}{extension}");
        }
    }

    if CPP_EXTENSIONS.iter().any(|ext| file_path.ends_with(ext))
        && code.contains("#include")
        && !code.contains("using namespace std")
    {
        code = insert_using_namespace_std(&code);
    }

    DiffEntry {
        file_path,
        where_to_paste: None,
        code,
        diff,
    }
}

fn insert_using_namespace_std(code: &str) -> String {
    let mut lines: Vec<&str> = code.lines().collect();
    let last_include = lines
        .iter()
        .rposition(|line| line.trim_start().starts_with("#include"));
    match last_include {
        Some(idx) => {
            lines.insert(idx + 1, "using namespace std;");
            lines.join("\n")
        }
        None => code.to_string(),
    }
}

fn derive_paste_instructions(diffs: &[DiffEntry]) -> Vec<String> {
    diffs
        .iter()
        .map(|d| format!("Paste the contents of the diff into `{}`.", d.file_path))
        .collect()
}

fn validate_tests(tests: &str) -> String {
    let cleaned = strip_fences(tests);
    let lower = cleaned.to_lowercase();
    let is_placeholder = PLACEHOLDER_TEST_STRINGS
        .iter()
        .any(|p| lower.trim() == *p || (cleaned.len() < 40 && lower.contains(p)));
    let looks_like_code = ["def ", "import ", "class ", "assert "]
        .iter()
        .any(|marker| cleaned.contains(marker));

    if is_placeholder || !looks_like_code {
        String::new()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_longest_algorithm_match() {
        assert_eq!(
            detect_algorithm_hint("please implement a binary search tree for me"),
            Some("binary_search_tree")
        );
    }

    #[test]
    fn detects_target_extension_from_request() {
        assert_eq!(detect_target_extension("write this in rust please"), ".rs");
        assert_eq!(detect_target_extension("no language mentioned"), ".py");
    }

    #[test]
    fn cpp_change_gets_using_namespace_std_inserted() {
        let change = RawChange {
            file_path: "merge_sort.cpp".to_string(),
            code: "#include <vector>\nint main() { return 0; }".to_string(),
            diff: String::new(),
        };
        let entry = post_process_change(change, Some("merge_sort"), ".cpp");
        assert!(entry.code.contains("using namespace std;"));
    }

    #[test]
    fn wrong_file_path_is_corrected_to_algorithm_slug() {
        let change = RawChange {
            file_path: "solution.py".to_string(),
            code: "def f(): pass".to_string(),
            diff: String::new(),
        };
        let entry = post_process_change(change, Some("merge_sort"), ".py");
        assert_eq!(entry.file_path, "merge_sort.py");
    }

    #[test]
    fn validate_tests_rejects_placeholder() {
        assert_eq!(validate_tests("test code here"), "");
    }

    #[test]
    fn validate_tests_accepts_real_code() {
        let tests = "import pytest\ndef test_ok():\n    assert True";
        assert_eq!(validate_tests(tests), tests);
    }
}
