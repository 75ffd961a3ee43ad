//! Bounded, time-budgeted indexing (`spec.md` §4.4), grounded in
//! `original_source/backend/app/services/indexer.py`.

use crate::chunk::{chunk_repository, Chunk};
use crate::error::{IndexError, Result};
use crate::sidecar::{read_sidecar, write_sidecar, IndexSidecar};
use crate::vectorstore::{StoredChunk, VectorStore};
use futures::stream::{self, StreamExt};
use repoforge_providers::EmbeddingChain;
use repoforge_repo::{FileInfo, RepositoryManager};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub data_dir: PathBuf,
    pub use_persistent_index: bool,
    pub batch_size: usize,
    pub file_read_concurrency: usize,
    pub max_index_files: usize,
    pub max_file_size_bytes: u64,
    pub max_index_total_bytes: u64,
    pub max_chunks: usize,
    pub time_budget_seconds: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            use_persistent_index: false,
            batch_size: 250,
            file_read_concurrency: 32,
            max_index_files: 900,
            max_file_size_bytes: 256 * 1024,
            max_index_total_bytes: 20 * 1024 * 1024,
            max_chunks: 2500,
            time_budget_seconds: 55,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexOutcome {
    pub indexed: bool,
    pub chunk_count: usize,
    pub from_cache: bool,
}

pub struct Indexer {
    repo_manager: Arc<RepositoryManager>,
    embeddings: Arc<EmbeddingChain>,
    store: Arc<dyn VectorStore>,
    config: IndexerConfig,
}

impl Indexer {
    pub fn new(
        repo_manager: Arc<RepositoryManager>,
        embeddings: Arc<EmbeddingChain>,
        store: Arc<dyn VectorStore>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            repo_manager,
            embeddings,
            store,
            config,
        }
    }

    #[instrument(skip(self), fields(repo_id = %repo_id))]
    pub async fn index_repo(&self, repo_id: &str, force: bool) -> Result<IndexOutcome> {
        let record = self
            .repo_manager
            .get(repo_id)
            .await
            .ok_or_else(|| IndexError::repo_not_found(repo_id))?;

        if !force && self.config.use_persistent_index {
            if let Some(sidecar) = read_sidecar(&self.config.data_dir, repo_id)? {
                if sidecar.commit_hash == record.commit_hash
                    && self.store.collection_info(repo_id).await?.is_some()
                {
                    info!("serving index from cache, commit unchanged");
                    return Ok(IndexOutcome {
                        indexed: true,
                        chunk_count: sidecar.chunk_count,
                        from_cache: true,
                    });
                }
            }
        }

        let outcome = self.run_index(repo_id, &record.commit_hash).await;
        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let _ = self
                    .repo_manager
                    .update(repo_id, false, |r| r.is_indexing = false)
                    .await;
                Err(e)
            }
        }
    }

    async fn run_index(&self, repo_id: &str, commit_hash: &str) -> Result<IndexOutcome> {
        self.repo_manager
            .update(repo_id, false, |r| {
                r.is_indexing = true;
                r.index_progress_pct = 0;
            })
            .await?;

        let deadline = Instant::now() + Duration::from_secs(self.config.time_budget_seconds);
        let read_deadline = Instant::now() + Duration::from_secs(self.config.time_budget_seconds) * 45 / 100;

        let files = self.repo_manager.list_files(repo_id).await?;
        let selected = select_files(
            &files,
            self.config.max_file_size_bytes,
            self.config.max_index_files,
            self.config.max_index_total_bytes,
        );

        let read = self.read_selected_files(repo_id, &selected, read_deadline).await;
        self.repo_manager
            .update(repo_id, false, |r| r.index_progress_pct = 10)
            .await?;

        let (mut chunks, _stats) = chunk_repository(repo_id, &read);
        if chunks.len() > self.config.max_chunks {
            chunks.truncate(self.config.max_chunks);
        }

        self.repo_manager
            .update(repo_id, false, |r| r.index_progress_pct = 15)
            .await?;

        self.store.recreate_collection(repo_id).await?;

        let total = chunks.len();
        let processed = self.embed_and_insert(repo_id, &chunks, deadline, total).await?;

        self.repo_manager
            .update(repo_id, true, |r| {
                r.indexed = true;
                r.is_indexing = false;
                r.chunk_count = processed;
                r.index_processed_chunks = processed;
                r.index_total_chunks = total;
                r.index_progress_pct = 100;
            })
            .await?;

        if self.config.use_persistent_index {
            write_sidecar(
                &self.config.data_dir,
                repo_id,
                &IndexSidecar {
                    commit_hash: commit_hash.to_string(),
                    chunk_count: processed,
                    indexed_at: chrono::Utc::now(),
                },
            )?;
        }

        Ok(IndexOutcome {
            indexed: true,
            chunk_count: processed,
            from_cache: false,
        })
    }

    async fn read_selected_files(
        &self,
        repo_id: &str,
        files: &[FileInfo],
        deadline: Instant,
    ) -> Vec<(String, String)> {
        let concurrency = self.config.file_read_concurrency;
        let repo_manager = &self.repo_manager;
        stream::iter(files.iter().cloned())
            .map(|f| {
                let repo_id = repo_id.to_string();
                async move {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    match repo_manager.read_file(&repo_id, &f.file_path).await {
                        Ok(content) => Some((f.file_path, content)),
                        Err(e) => {
                            warn!(file_path = %f.file_path, error = %e, "skipping unreadable file");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn embed_and_insert(
        &self,
        repo_id: &str,
        chunks: &[Chunk],
        deadline: Instant,
        total: usize,
    ) -> Result<usize> {
        let mut processed = 0usize;
        for batch in chunks.chunks(self.config.batch_size.max(1)) {
            if Instant::now() >= deadline {
                warn!(processed, total, "time budget exhausted, stopping indexing with partial result");
                break;
            }
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embeddings.embed(&texts).await?;
            let points: Vec<StoredChunk> = batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, embedding)| StoredChunk { chunk, embedding })
                .collect();
            self.store.upsert(repo_id, points).await?;
            processed += batch.len();

            let pct = if total == 0 {
                99
            } else {
                (15 + ((processed as f32 / total as f32) * 84.0) as u32).min(99) as u8
            };
            self.repo_manager
                .update(repo_id, false, |r| {
                    r.index_processed_chunks = processed;
                    r.index_total_chunks = total;
                    r.index_progress_pct = pct;
                })
                .await?;
        }
        Ok(processed)
    }
}

/// `spec.md` §4.4 selection policy: `type_rank` 0=code, 1=config, 2=other;
/// greedily include by `(type_rank, depth, |size-24KB|)` until a cap trips.
fn select_files(
    files: &[FileInfo],
    max_file_size_bytes: u64,
    max_index_files: usize,
    max_index_total_bytes: u64,
) -> Vec<FileInfo> {
    const TARGET_SIZE: i64 = 24 * 1024;

    let mut eligible: Vec<&FileInfo> = files
        .iter()
        .filter(|f| f.size > 0 && f.size <= max_file_size_bytes)
        .collect();

    eligible.sort_by_key(|f| {
        let type_rank = type_rank(&f.language);
        let depth = f.file_path.matches('/').count();
        let size_delta = (f.size as i64 - TARGET_SIZE).unsigned_abs();
        (type_rank, depth, size_delta)
    });

    let mut selected = Vec::new();
    let mut total_bytes = 0u64;
    for f in eligible {
        if selected.len() >= max_index_files || total_bytes + f.size > max_index_total_bytes {
            break;
        }
        total_bytes += f.size;
        selected.push(f.clone());
    }

    if selected.is_empty() {
        if let Some(smallest) = files.iter().filter(|f| f.size > 0).min_by_key(|f| f.size) {
            selected.push(smallest.clone());
        }
    }
    selected
}

fn type_rank(language: &str) -> u8 {
    const CONFIG_LANGS: &[&str] = &["json", "yaml", "toml", "xml", "ini"];
    const DOC_LANGS: &[&str] = &["markdown", "rst", "text"];
    if DOC_LANGS.contains(&language) {
        2
    } else if CONFIG_LANGS.contains(&language) {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, language: &str, size: u64) -> FileInfo {
        FileInfo {
            file_path: path.to_string(),
            size,
            language: language.to_string(),
            estimated_tokens: (size / 4) as usize,
        }
    }

    #[test]
    fn select_files_prefers_code_over_config_and_docs() {
        let files = vec![
            file("README.md", "markdown", 1000),
            file("config.json", "json", 1000),
            file("src/main.rs", "rust", 1000),
        ];
        let selected = select_files(&files, 1_000_000, 10, 1_000_000);
        assert_eq!(selected[0].file_path, "src/main.rs");
    }

    #[test]
    fn select_files_respects_total_byte_cap() {
        let files = vec![
            file("a.rs", "rust", 500),
            file("b.rs", "rust", 500),
            file("c.rs", "rust", 500),
        ];
        let selected = select_files(&files, 1_000_000, 10, 900);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn select_files_includes_at_least_one_when_nothing_qualifies() {
        let files = vec![file("huge.rs", "rust", 10_000_000)];
        let selected = select_files(&files, 1_000, 10, 1_000_000);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn select_files_excludes_zero_byte_files() {
        let files = vec![file("empty.rs", "rust", 0)];
        let selected = select_files(&files, 1_000_000, 10, 1_000_000);
        assert!(selected.is_empty());
    }
}
