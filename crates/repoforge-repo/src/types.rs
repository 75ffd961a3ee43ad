//! Repository Record (`spec.md` §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RepoStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub languages: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoRecord {
    pub repo_id: String,
    pub repo_name: String,
    pub repo_url: String,
    pub commit_hash: String,
    pub branch: String,
    pub local_path: PathBuf,
    pub stats: RepoStats,
    pub indexed: bool,
    pub chunk_count: usize,
    pub is_indexing: bool,
    pub index_progress_pct: u8,
    pub index_processed_chunks: usize,
    pub index_total_chunks: usize,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
}

impl RepoRecord {
    pub fn new(
        repo_id: String,
        repo_name: String,
        repo_url: String,
        commit_hash: String,
        branch: String,
        local_path: PathBuf,
        stats: RepoStats,
    ) -> Self {
        Self {
            repo_id,
            repo_name,
            repo_url,
            commit_hash,
            branch,
            local_path,
            stats,
            indexed: false,
            chunk_count: 0,
            is_indexing: false,
            index_progress_pct: 0,
            index_processed_chunks: 0,
            index_total_chunks: 0,
            loaded_at: chrono::Utc::now(),
        }
    }

    /// `spec.md` §3 invariant: `indexed = true ⇒ chunk_count ≥ 0 ∧ commit_hash ≠ ""`.
    pub fn check_invariants(&self) -> bool {
        if self.indexed && self.commit_hash.is_empty() {
            return false;
        }
        true
    }

    /// Reset indexing state for ephemeral-store rehydration
    /// (`spec.md` §3: "if the vector store is ephemeral, `indexed` is reset
    /// to false on rehydrate").
    pub fn reset_for_ephemeral_rehydrate(&mut self) {
        self.indexed = false;
        self.chunk_count = 0;
        self.is_indexing = false;
        self.index_progress_pct = 0;
        self.index_processed_chunks = 0;
        self.index_total_chunks = 0;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    pub file_path: String,
    pub size: u64,
    pub language: String,
    pub estimated_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_without_commit_hash_violates_invariant() {
        let mut record = RepoRecord::new(
            "abc".into(),
            "repo".into(),
            "https://example.com/repo".into(),
            String::new(),
            "main".into(),
            PathBuf::from("/tmp/repo"),
            RepoStats::default(),
        );
        record.indexed = true;
        assert!(!record.check_invariants());
    }

    #[test]
    fn ephemeral_rehydrate_clears_index_state() {
        let mut record = RepoRecord::new(
            "abc".into(),
            "repo".into(),
            "https://example.com/repo".into(),
            "deadbeef".into(),
            "main".into(),
            PathBuf::from("/tmp/repo"),
            RepoStats::default(),
        );
        record.indexed = true;
        record.chunk_count = 10;
        record.reset_for_ephemeral_rehydrate();
        assert!(!record.indexed);
        assert_eq!(record.chunk_count, 0);
    }
}
