//! Vector collection store (`spec.md` §3, §4.4), grounded in
//! `codeprysm-search::client::QdrantStore` for the persistent tier.

use crate::chunk::Chunk;
use crate::error::{IndexError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionInfo {
    pub points_count: u64,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

fn collection_name(repo_id: &str) -> String {
    format!("repo_{repo_id}")
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let similarity = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    1.0 - similarity
}

/// Owned by the Indexer; consumed read-only by the Retriever.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn recreate_collection(&self, repo_id: &str) -> Result<()>;
    async fn upsert(&self, repo_id: &str, points: Vec<StoredChunk>) -> Result<()>;
    async fn query(&self, repo_id: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;
    async fn collection_info(&self, repo_id: &str) -> Result<Option<CollectionInfo>>;
    async fn delete_collection(&self, repo_id: &str) -> Result<()>;
}

/// Process-wide in-memory store shared across repositories when
/// `use_persistent_index = false` (`spec.md` §4.4 "share a process-wide
/// ephemeral client").
#[derive(Default)]
pub struct EphemeralVectorStore {
    collections: RwLock<HashMap<String, Vec<StoredChunk>>>,
}

impl EphemeralVectorStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl VectorStore for EphemeralVectorStore {
    async fn recreate_collection(&self, repo_id: &str) -> Result<()> {
        self.collections
            .write()
            .await
            .insert(collection_name(repo_id), Vec::new());
        Ok(())
    }

    async fn upsert(&self, repo_id: &str, points: Vec<StoredChunk>) -> Result<()> {
        let mut guard = self.collections.write().await;
        let entry = guard.entry(collection_name(repo_id)).or_default();
        entry.extend(points);
        Ok(())
    }

    async fn query(&self, repo_id: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let guard = self.collections.read().await;
        let Some(points) = guard.get(&collection_name(repo_id)) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<ScoredChunk> = points
            .iter()
            .map(|p| ScoredChunk {
                chunk: p.chunk.clone(),
                distance: cosine_distance(vector, &p.embedding),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
        scored.truncate(limit);
        Ok(scored)
    }

    async fn collection_info(&self, repo_id: &str) -> Result<Option<CollectionInfo>> {
        let guard = self.collections.read().await;
        Ok(guard.get(&collection_name(repo_id)).map(|points| CollectionInfo {
            points_count: points.len() as u64,
        }))
    }

    async fn delete_collection(&self, repo_id: &str) -> Result<()> {
        self.collections.write().await.remove(&collection_name(repo_id));
        Ok(())
    }
}

/// Qdrant-backed persistent tier. Collection naming and payload shape follow
/// the teacher's `QdrantStore` (`repo_id`, `file_path`, line range, content).
pub struct PersistentVectorStore {
    client: qdrant_client::Qdrant,
    dimension: u64,
}

impl PersistentVectorStore {
    pub fn connect(url: &str, dimension: u64) -> Result<Self> {
        let client = qdrant_client::Qdrant::from_url(url)
            .build()
            .map_err(|e| IndexError::vector_store(e.to_string()))?;
        Ok(Self { client, dimension })
    }
}

#[async_trait]
impl VectorStore for PersistentVectorStore {
    async fn recreate_collection(&self, repo_id: &str) -> Result<()> {
        use qdrant_client::qdrant::{vectors_config::Config, CreateCollectionBuilder, Distance, VectorParams, VectorsConfig};

        let name = collection_name(repo_id);
        let _ = self.client.delete_collection(&name).await;
        let vectors_config = VectorsConfig {
            config: Some(Config::Params(VectorParams {
                size: self.dimension,
                distance: Distance::Cosine.into(),
                ..Default::default()
            })),
        };
        self.client
            .create_collection(CreateCollectionBuilder::new(&name).vectors_config(vectors_config))
            .await
            .map_err(|e| IndexError::vector_store(e.to_string()))?;
        Ok(())
    }

    async fn upsert(&self, repo_id: &str, points: Vec<StoredChunk>) -> Result<()> {
        use qdrant_client::qdrant::{PointStruct, UpsertPointsBuilder};
        use qdrant_client::Payload;
        use serde_json::json;

        if points.is_empty() {
            return Ok(());
        }
        let name = collection_name(repo_id);
        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let id = crate::ids::point_id(&p.chunk.chunk_id);
                let payload = Payload::try_from(json!({
                    "chunk_id": p.chunk.chunk_id,
                    "repo_id": p.chunk.repo_id,
                    "file_path": p.chunk.file_path,
                    "start_line": p.chunk.start_line,
                    "end_line": p.chunk.end_line,
                    "language": p.chunk.language,
                    "chunk_type": p.chunk.chunk_type.to_string(),
                    "content": p.chunk.content,
                }))
                .unwrap_or_default();
                PointStruct::new(id, p.embedding, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&name, qdrant_points).wait(true))
            .await
            .map_err(|e| IndexError::vector_store(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, repo_id: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        use qdrant_client::qdrant::SearchPointsBuilder;

        let name = collection_name(repo_id);
        let response = self
            .client
            .search_points(SearchPointsBuilder::new(&name, vector.to_vec(), limit as u64).with_payload(true))
            .await
            .map_err(|e| IndexError::vector_store(e.to_string()))?;

        let chunks = response
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload;
                let get_string = |key: &str| -> String {
                    payload.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
                };
                let get_u32 = |key: &str| -> u32 {
                    payload.get(key).and_then(|v| v.as_integer()).unwrap_or(0) as u32
                };
                let chunk_type = match get_string("chunk_type").as_str() {
                    "doc" => crate::chunk::ChunkType::Doc,
                    "config" => crate::chunk::ChunkType::Config,
                    _ => crate::chunk::ChunkType::Code,
                };
                let content = get_string("content");
                Some(ScoredChunk {
                    chunk: Chunk {
                        chunk_id: get_string("chunk_id"),
                        repo_id: get_string("repo_id"),
                        file_path: get_string("file_path"),
                        start_line: get_u32("start_line"),
                        end_line: get_u32("end_line"),
                        language: get_string("language"),
                        chunk_type,
                        token_count: content.len() / 4,
                        content,
                    },
                    distance: 1.0 - point.score,
                })
            })
            .collect();
        Ok(chunks)
    }

    async fn collection_info(&self, repo_id: &str) -> Result<Option<CollectionInfo>> {
        let name = collection_name(repo_id);
        let exists = self
            .client
            .collection_exists(&name)
            .await
            .map_err(|e| IndexError::vector_store(e.to_string()))?;
        if !exists {
            return Ok(None);
        }
        let info = self
            .client
            .collection_info(&name)
            .await
            .map_err(|e| IndexError::vector_store(e.to_string()))?;
        Ok(info.result.map(|r| CollectionInfo {
            points_count: r.points_count.unwrap_or(0),
        }))
    }

    async fn delete_collection(&self, repo_id: &str) -> Result<()> {
        let name = collection_name(repo_id);
        self.client
            .delete_collection(&name)
            .await
            .map_err(|e| IndexError::vector_store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkType;

    fn sample(chunk_id: &str, content: &str, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk {
            chunk: Chunk {
                chunk_id: chunk_id.to_string(),
                repo_id: "repo1".to_string(),
                file_path: "src/main.rs".to_string(),
                start_line: 1,
                end_line: 1,
                language: "rust".to_string(),
                chunk_type: ChunkType::Code,
                token_count: content.len() / 4,
                content: content.to_string(),
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn ephemeral_store_round_trips() {
        let store = EphemeralVectorStore::new();
        store.recreate_collection("repo1").await.unwrap();
        store
            .upsert(
                "repo1",
                vec![sample("a", "alpha", vec![1.0, 0.0]), sample("b", "beta", vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        let results = store.query("repo1", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_id, "a");
    }

    #[tokio::test]
    async fn missing_collection_queries_empty() {
        let store = EphemeralVectorStore::new();
        let results = store.query("missing", &[1.0], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn collection_info_reports_count() {
        let store = EphemeralVectorStore::new();
        store.recreate_collection("repo1").await.unwrap();
        store.upsert("repo1", vec![sample("a", "x", vec![1.0])]).await.unwrap();
        let info = store.collection_info("repo1").await.unwrap().unwrap();
        assert_eq!(info.points_count, 1);
    }
}
