//! Hybrid (semantic + lexical) retrieval (`spec.md` §4.5), grounded in
//! `original_source/backend/app/services/retriever.py`.

use crate::chunk::Chunk;
use crate::error::Result;
use crate::vectorstore::VectorStore;
use once_cell::sync::Lazy;
use regex::Regex;
use repoforge_providers::EmbeddingChain;
use std::collections::HashSet;
use std::sync::Arc;

pub const DEFAULT_K: usize = 5;

pub struct Retriever {
    embeddings: Arc<EmbeddingChain>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embeddings: Arc<EmbeddingChain>, store: Arc<dyn VectorStore>) -> Self {
        Self { embeddings, store }
    }

    pub async fn retrieve(&self, repo_id: &str, query: &str, k: usize) -> Result<Vec<Chunk>> {
        if self.store.collection_info(repo_id).await?.is_none() {
            return Ok(Vec::new());
        }

        let vectors = self.embeddings.embed(std::slice::from_ref(&query.to_string())).await?;
        let Some(query_vector) = vectors.into_iter().next() else {
            return Ok(Vec::new());
        };

        let pool_size = (3 * k).max(12);
        let candidates = self.store.query(repo_id, &query_vector, pool_size).await?;

        let query_tokens = tokens(query);
        let mut scored: Vec<(f32, Chunk)> = candidates
            .into_iter()
            .map(|c| {
                let score = rerank_score(&query_tokens, &c.chunk, c.distance);
                (score, c.chunk)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        scored.truncate(k);
        Ok(scored.into_iter().map(|(_, chunk)| chunk).collect())
    }
}

/// `score = 0.7 * lexical + 0.3 * semantic` (`spec.md` §4.5).
fn rerank_score(query_tokens: &HashSet<String>, chunk: &Chunk, distance: f32) -> f32 {
    let lexical = lexical_score(query_tokens, chunk);
    let semantic = if distance.is_finite() { 1.0 / (1.0 + distance) } else { 0.0 };
    0.7 * lexical + 0.3 * semantic
}

fn lexical_score(query_tokens: &HashSet<String>, chunk: &Chunk) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let mut content_tokens = tokens(&chunk.content);
    content_tokens.extend(tokens(&chunk.file_path));
    let overlap = query_tokens.intersection(&content_tokens).count();
    overlap as f32 / query_tokens.len().max(1) as f32
}

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_]{2,}").unwrap());

/// Alphanumeric/underscore substrings of length >= 2, lowercased.
fn tokens(s: &str) -> HashSet<String> {
    TOKEN_PATTERN
        .find_iter(s)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_filters_short_substrings() {
        let t = tokens("fn a_b() { x }");
        assert!(t.contains("a_b"));
        assert!(!t.contains("a"));
    }

    #[test]
    fn lexical_score_counts_overlap() {
        use crate::chunk::ChunkType;
        let chunk = Chunk {
            chunk_id: "id".into(),
            repo_id: "repo".into(),
            file_path: "src/auth.rs".into(),
            start_line: 1,
            end_line: 5,
            language: "rust".into(),
            chunk_type: ChunkType::Code,
            token_count: 10,
            content: "fn authenticate_user() {}".into(),
        };
        let query_tokens = tokens("authenticate user");
        let score = lexical_score(&query_tokens, &chunk);
        assert!(score > 0.0);
    }

    #[test]
    fn rerank_score_handles_non_finite_distance() {
        use crate::chunk::ChunkType;
        let chunk = Chunk {
            chunk_id: "id".into(),
            repo_id: "repo".into(),
            file_path: "src/a.rs".into(),
            start_line: 1,
            end_line: 1,
            language: "rust".into(),
            chunk_type: ChunkType::Code,
            token_count: 1,
            content: "x".into(),
        };
        let score = rerank_score(&HashSet::new(), &chunk, f32::NAN);
        assert_eq!(score, 0.0);
    }
}
