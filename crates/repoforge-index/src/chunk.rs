//! Type-aware chunking (`spec.md` §3, §4.3), grounded in
//! `original_source/backend/app/services/chunker.py`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub const CODE_CHUNK_LINES: usize = 150;
pub const CODE_CHUNK_OVERLAP: usize = 20;
pub const DOC_CHUNK_TOKENS: usize = 500;
pub const DOC_CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Code,
    Doc,
    Config,
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkType::Code => write!(f, "code"),
            ChunkType::Doc => write!(f, "doc"),
            ChunkType::Config => write!(f, "config"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub repo_id: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub language: String,
    pub chunk_type: ChunkType,
    pub token_count: usize,
    pub content: String,
}

/// `chunk_id = sha256(repo_id + ":" + file_path + ":" + start_line)[:16]`.
pub fn chunk_id(repo_id: &str, file_path: &str, start_line: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repo_id.as_bytes());
    hasher.update(b":");
    hasher.update(file_path.as_bytes());
    hasher.update(b":");
    hasher.update(start_line.to_string().as_bytes());
    let digest = hasher.finalize();
    format!("{digest:x}")[..16].to_string()
}

fn estimate_tokens(s: &str) -> usize {
    (s.len() / 4).max(1)
}

static DOC_EXTENSIONS: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["md", "rst", "txt", "adoc"]);
static CONFIG_EXTENSIONS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "xml",
    ]
});
static CONFIG_FILENAMES: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["Dockerfile", "Makefile", "Rakefile", "Gemfile"]);

static LANGUAGE_TABLE: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("py", "python"),
        ("js", "javascript"),
        ("jsx", "javascript"),
        ("ts", "typescript"),
        ("tsx", "typescript"),
        ("java", "java"),
        ("go", "go"),
        ("rs", "rust"),
        ("rb", "ruby"),
        ("c", "c"),
        ("h", "c"),
        ("cpp", "cpp"),
        ("cc", "cpp"),
        ("cxx", "cpp"),
        ("hpp", "cpp"),
        ("cs", "csharp"),
        ("swift", "swift"),
        ("kt", "kotlin"),
        ("scala", "scala"),
        ("php", "php"),
        ("pl", "perl"),
        ("lua", "lua"),
        ("sh", "bash"),
        ("bash", "bash"),
        ("zsh", "bash"),
        ("ps1", "powershell"),
        ("html", "html"),
        ("css", "css"),
        ("scss", "scss"),
        ("vue", "vue"),
        ("json", "json"),
        ("yaml", "yaml"),
        ("yml", "yaml"),
        ("toml", "toml"),
        ("xml", "xml"),
        ("md", "markdown"),
        ("rst", "rst"),
        ("txt", "text"),
    ]
    .into_iter()
    .collect()
});

fn extension_of(file_path: &str) -> String {
    std::path::Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn file_name_of(file_path: &str) -> String {
    std::path::Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string()
}

fn language_for(ext: &str) -> String {
    LANGUAGE_TABLE
        .get(ext)
        .map(|s| s.to_string())
        .unwrap_or_else(|| if ext.is_empty() { "text".to_string() } else { ext.to_string() })
}

fn chunk_type_for(file_path: &str, ext: &str) -> ChunkType {
    if DOC_EXTENSIONS.contains(&ext) {
        return ChunkType::Doc;
    }
    if CONFIG_EXTENSIONS.contains(&ext) || CONFIG_FILENAMES.contains(&file_name_of(file_path).as_str())
    {
        return ChunkType::Config;
    }
    ChunkType::Code
}

/// Splits `content` into chunks. Pure and deterministic (`spec.md` §8 property 1).
pub fn chunk_file(content: &str, repo_id: &str, file_path: &str) -> Vec<Chunk> {
    let ext = extension_of(file_path);
    let language = language_for(&ext);
    let chunk_type = chunk_type_for(file_path, &ext);

    match chunk_type {
        ChunkType::Doc => chunk_doc(content, repo_id, file_path, &language),
        ChunkType::Config => {
            if estimate_tokens(content) < DOC_CHUNK_TOKENS {
                vec![whole_file_chunk(content, repo_id, file_path, &language, ChunkType::Config)]
            } else {
                chunk_code(content, repo_id, file_path, &language, ChunkType::Config)
            }
        }
        ChunkType::Code => chunk_code(content, repo_id, file_path, &language, ChunkType::Code),
    }
}

fn whole_file_chunk(
    content: &str,
    repo_id: &str,
    file_path: &str,
    language: &str,
    chunk_type: ChunkType,
) -> Chunk {
    let lines = content.lines().count().max(1) as u32;
    Chunk {
        chunk_id: chunk_id(repo_id, file_path, 1),
        repo_id: repo_id.to_string(),
        file_path: file_path.to_string(),
        start_line: 1,
        end_line: lines,
        language: language.to_string(),
        chunk_type,
        token_count: estimate_tokens(content),
        content: content.to_string(),
    }
}

/// Sliding-window line chunking used for code (and overflowed config) files.
/// The `if next <= i { i = end }` branch is the infinite-loop guard for
/// files whose overlap would otherwise prevent the cursor from advancing.
fn chunk_code(
    content: &str,
    repo_id: &str,
    file_path: &str,
    language: &str,
    chunk_type: ChunkType,
) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    if total == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut i = 0usize;
    while i < total {
        let end = (i + CODE_CHUNK_LINES).min(total);
        let start_line = (i + 1) as u32;
        let end_line = end as u32;
        let slice = lines[i..end].join("\n");
        chunks.push(Chunk {
            chunk_id: chunk_id(repo_id, file_path, start_line),
            repo_id: repo_id.to_string(),
            file_path: file_path.to_string(),
            start_line,
            end_line,
            language: language.to_string(),
            chunk_type,
            token_count: estimate_tokens(&slice),
            content: slice,
        });

        if end >= total {
            break;
        }
        let next = end.saturating_sub(CODE_CHUNK_OVERLAP);
        i = if next <= i { end } else { next };
    }
    chunks
}

/// Accumulates lines into token-budgeted chunks with a tail overlap carried
/// into the next chunk's start.
fn chunk_doc(content: &str, repo_id: &str, file_path: &str, language: &str) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    if total == 0 {
        return Vec::new();
    }
    let overlap_lines = (DOC_CHUNK_OVERLAP / 50).max(1);

    let mut chunks = Vec::new();
    let mut i = 0usize;
    while i < total {
        let mut end = i;
        let mut tokens = 0usize;
        while end < total {
            let line_tokens = estimate_tokens(lines[end]);
            if tokens > 0 && tokens + line_tokens > DOC_CHUNK_TOKENS {
                break;
            }
            tokens += line_tokens;
            end += 1;
        }
        if end == i {
            end = i + 1;
        }
        let start_line = (i + 1) as u32;
        let end_line = end as u32;
        let slice = lines[i..end].join("\n");
        chunks.push(Chunk {
            chunk_id: chunk_id(repo_id, file_path, start_line),
            repo_id: repo_id.to_string(),
            file_path: file_path.to_string(),
            start_line,
            end_line,
            language: language.to_string(),
            chunk_type: ChunkType::Doc,
            token_count: estimate_tokens(&slice),
            content: slice,
        });

        if end >= total {
            break;
        }
        let next = end.saturating_sub(overlap_lines);
        i = if next <= i { end } else { next };
    }
    chunks
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkStats {
    pub total_chunks: usize,
    pub by_language: HashMap<String, usize>,
    pub by_type: HashMap<String, usize>,
}

/// Aggregates `chunk_file` over every `(file_path, content)` pair.
pub fn chunk_repository(repo_id: &str, files: &[(String, String)]) -> (Vec<Chunk>, ChunkStats) {
    let mut all_chunks = Vec::new();
    let mut stats = ChunkStats::default();

    for (file_path, content) in files {
        let chunks = chunk_file(content, repo_id, file_path);
        for chunk in &chunks {
            *stats.by_language.entry(chunk.language.clone()).or_insert(0) += 1;
            *stats.by_type.entry(chunk.chunk_type.to_string()).or_insert(0) += 1;
        }
        stats.total_chunks += chunks.len();
        all_chunks.extend(chunks);
    }

    (all_chunks, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_file_is_pure() {
        let content = (0..500).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let a = chunk_file(&content, "repo1", "src/main.rs");
        let b = chunk_file(&content, "repo1", "src/main.rs");
        assert_eq!(a, b);
    }

    #[test]
    fn chunk_ids_match_formula() {
        let content = "fn main() {}\n";
        let chunks = chunk_file(content, "repo1", "src/main.rs");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, chunk_id("repo1", "src/main.rs", 1));
        assert_eq!(chunks[0].chunk_id.len(), 16);
    }

    #[test]
    fn code_chunking_splits_large_files() {
        let content = (0..400).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_file(&content, "repo1", "src/lib.rs");
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.start_line <= c.end_line);
        }
    }

    #[test]
    fn single_line_file_terminates() {
        let chunks = chunk_file("x", "repo1", "src/lib.rs");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn doc_chunking_tags_type_doc() {
        let content = "# Title\n\nSome text.\n";
        let chunks = chunk_file(content, "repo1", "README.md");
        assert_eq!(chunks[0].chunk_type, ChunkType::Doc);
        assert_eq!(chunks[0].language, "markdown");
    }

    #[test]
    fn small_config_file_is_single_chunk() {
        let content = "{\"a\": 1}\n";
        let chunks = chunk_file(content, "repo1", "package.json");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Config);
    }

    #[test]
    fn large_config_file_falls_through_to_code_strategy() {
        let big_value = "x".repeat(3000);
        let content = format!("{{\"a\": \"{big_value}\"}}\n");
        let chunks = chunk_file(&content, "repo1", "data.json");
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::Config));
    }

    #[test]
    fn dockerfile_is_config_type() {
        let chunks = chunk_file("FROM rust:1\n", "repo1", "Dockerfile");
        assert_eq!(chunks[0].chunk_type, ChunkType::Config);
    }

    #[test]
    fn chunk_repository_aggregates_stats() {
        let files = vec![
            ("a.rs".to_string(), "fn a() {}\n".to_string()),
            ("README.md".to_string(), "# hi\n".to_string()),
        ];
        let (chunks, stats) = chunk_repository("repo1", &files);
        assert_eq!(chunks.len(), stats.total_chunks);
        assert_eq!(stats.by_type.get("code"), Some(&1));
        assert_eq!(stats.by_type.get("doc"), Some(&1));
    }
}
