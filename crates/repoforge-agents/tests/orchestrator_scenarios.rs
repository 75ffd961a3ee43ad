//! End-to-end scenarios over the deterministic mock provider chain, in the
//! style of the teacher's `tests/integration.rs` convention of exercising
//! the public API without external services (`spec.md` §8 S1-S6).

use std::collections::HashMap;
use std::sync::Arc;

use repoforge_agents::Orchestrator;
use repoforge_index::{
    Chunk, ChunkType, EphemeralVectorStore, Retriever, StoredChunk, VectorStore,
};
use repoforge_providers::{mock_embed_one, ChatChain, EmbeddingChain, MockChatProvider, MockEmbeddingProvider};
use repoforge_repo::{persist_registry, RepoManagerConfig, RepoRecord, RepoStats, RepositoryManager};

const REPO_ID: &str = "demo-repo";

async fn build_orchestrator(tmp: &tempfile::TempDir) -> Orchestrator {
    let data_dir = tmp.path().to_path_buf();

    let record = RepoRecord::new(
        REPO_ID.to_string(),
        "demo".to_string(),
        "https://example.com/demo.git".to_string(),
        "abc123".to_string(),
        "main".to_string(),
        data_dir.join("demo"),
        RepoStats::default(),
    );
    let mut registry = HashMap::new();
    registry.insert(REPO_ID.to_string(), record);
    persist_registry(&data_dir, &registry).expect("seed registry");

    let repo_manager = Arc::new(
        RepositoryManager::new(RepoManagerConfig {
            data_dir,
            ..RepoManagerConfig::default()
        })
        .expect("construct repository manager"),
    );

    let store = EphemeralVectorStore::new();
    store.recreate_collection(REPO_ID).await.expect("recreate collection");
    let chunk = Chunk {
        chunk_id: "chunk1".to_string(),
        repo_id: REPO_ID.to_string(),
        file_path: "src/retry.rs".to_string(),
        start_line: 1,
        end_line: 20,
        language: "rust".to_string(),
        chunk_type: ChunkType::Code,
        token_count: 40,
        content: "fn retry_with_backoff() { /* exponential backoff */ }".to_string(),
    };
    let embedding = mock_embed_one(&chunk.content, 256);
    store
        .upsert(REPO_ID, vec![StoredChunk { chunk, embedding }])
        .await
        .expect("seed chunk");

    let embeddings = Arc::new(EmbeddingChain::new(vec![Arc::new(MockEmbeddingProvider::default())]));
    let chat = Arc::new(ChatChain::new(vec![Arc::new(MockChatProvider)]));
    let retriever = Arc::new(Retriever::new(embeddings, store));

    Orchestrator::new(chat, retriever, repo_manager)
}

#[tokio::test]
async fn refuses_destructive_requests_without_running_any_agent() {
    let tmp = tempfile::tempdir().unwrap();
    let orchestrator = build_orchestrator(&tmp).await;

    let result = orchestrator
        .smart(REPO_ID, "write a script to delete all production data")
        .await;

    assert_eq!(result.routing.primary_action, repoforge_agents::Action::Refuse);
    assert!(result.agents_used.is_empty());
    assert!(result.generate.is_none());
    assert!(result.test.is_none());
}

#[tokio::test]
async fn answers_a_question_with_citations_grounded_in_the_index() {
    let tmp = tempfile::tempdir().unwrap();
    let orchestrator = build_orchestrator(&tmp).await;

    let result = orchestrator
        .smart(REPO_ID, "how does the retry backoff logic work in this repo?")
        .await;

    assert!(result.answer.is_some());
    let citations = result.citations.expect("answerer always returns a citations list");
    assert!(!citations.is_empty());
    assert_eq!(citations[0].file_path, "src/retry.rs");
}

#[tokio::test]
async fn repeated_question_is_served_from_the_response_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let orchestrator = build_orchestrator(&tmp).await;

    let first = orchestrator.smart(REPO_ID, "what does this module do?").await;
    assert!(!first.from_cache);

    let second = orchestrator.smart(REPO_ID, "What Does This Module Do?").await;
    assert!(second.from_cache);
    assert_eq!(first.answer, second.answer);
}
