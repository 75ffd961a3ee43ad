//! CLI command implementations and the composition root that wires the
//! provider chains, repository manager, index, and orchestrator together.

pub mod ask;
pub mod generate;
pub mod index;
pub mod load;
pub mod smart;

use std::sync::Arc;

use anyhow::{Context, Result};
use repoforge_agents::Orchestrator;
use repoforge_config::{ConfigLoader, Settings};
use repoforge_index::{EphemeralVectorStore, Indexer, IndexerConfig, PersistentVectorStore, Retriever, VectorStore};
use repoforge_providers::{
    ChatChain, ChatProviderKind, EmbeddingChain, HttpChatConfig, HttpChatProvider,
    HttpEmbeddingConfig, HttpEmbeddingProvider, MockChatProvider, MockEmbeddingProvider,
};
use repoforge_repo::{RepoManagerConfig, RepositoryManager};

use crate::GlobalOptions;

/// Every component a command needs, constructed once in [`build_stack`].
pub struct Stack {
    pub settings: Settings,
    pub repo_manager: Arc<RepositoryManager>,
    pub indexer: Arc<Indexer>,
    pub retriever: Arc<Retriever>,
    pub chat: Arc<ChatChain>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Load configuration, honoring `--config` if given (`spec.md` §6 precedence:
/// defaults -> file -> environment).
pub fn load_settings(global: &GlobalOptions) -> Result<Settings> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &global.config {
        loader = loader.with_file(path);
    }
    loader.load().context("failed to load repoforge configuration")
}

fn resolve_key(env_var: &Option<String>) -> Option<String> {
    env_var.as_ref().and_then(|name| std::env::var(name).ok())
}

fn build_embedding_chain(settings: &Settings) -> Arc<EmbeddingChain> {
    let providers = &settings.providers;
    let mut chain: Vec<Arc<dyn repoforge_providers::EmbeddingProvider>> = Vec::new();

    if let Some(url) = &providers.local_embedding_endpoint {
        chain.push(Arc::new(HttpEmbeddingProvider::new(HttpEmbeddingConfig::local(url))));
    }
    if let Some(url) = &providers.remote_free_embedding_endpoint {
        let key = resolve_key(&providers.remote_free_embedding_key_env);
        chain.push(Arc::new(HttpEmbeddingProvider::new(HttpEmbeddingConfig::remote_free(
            url, key,
        ))));
    }
    if let Some(url) = &providers.remote_paid_embedding_endpoint {
        let key = resolve_key(&providers.remote_paid_embedding_key_env);
        chain.push(Arc::new(HttpEmbeddingProvider::new(HttpEmbeddingConfig::remote_paid(
            url, key,
        ))));
    }
    // Terminal link: never errors, keeps the chain usable with zero
    // configured endpoints (`spec.md` §4.1 selection rule).
    chain.push(Arc::new(MockEmbeddingProvider::default()));

    Arc::new(EmbeddingChain::new(chain))
}

fn build_chat_chain(settings: &Settings) -> Arc<ChatChain> {
    let providers = &settings.providers;
    let mut chain: Vec<Arc<dyn repoforge_providers::ChatProvider>> = Vec::new();

    if let Some(url) = &providers.chat_local_base_url {
        // A single local endpoint serves all three local tiers, distinguished
        // only by model name; operators who run distinct local models per
        // tier can still do so via `repoforge.toml` overrides of this field.
        chain.push(Arc::new(HttpChatProvider::new(HttpChatConfig::new(
            ChatProviderKind::LocalRouter,
            url,
            "local-router",
            None,
        ))));
        chain.push(Arc::new(HttpChatProvider::new(HttpChatConfig::new(
            ChatProviderKind::LocalA,
            url,
            "local-a",
            None,
        ))));
        chain.push(Arc::new(HttpChatProvider::new(HttpChatConfig::new(
            ChatProviderKind::LocalB,
            url,
            "local-b",
            None,
        ))));
    }
    if let Some(url) = &providers.chat_remote_paid_base_url {
        let key = resolve_key(&providers.chat_remote_paid_key_env);
        chain.push(Arc::new(HttpChatProvider::new(HttpChatConfig::new(
            ChatProviderKind::RemotePaid,
            url,
            "remote-paid",
            key,
        ))));
    }
    if let Some(url) = &providers.chat_remote_free_base_url {
        let key = resolve_key(&providers.chat_remote_free_key_env);
        chain.push(Arc::new(HttpChatProvider::new(HttpChatConfig::new(
            ChatProviderKind::RemoteFree,
            url,
            "remote-free",
            key,
        ))));
    }
    chain.push(Arc::new(MockChatProvider));

    Arc::new(ChatChain::new(chain))
}

fn build_vector_store(settings: &Settings, embeddings: &EmbeddingChain) -> Result<Arc<dyn VectorStore>> {
    if settings.use_persistent_index {
        let url = settings
            .providers
            .local_embedding_endpoint
            .clone()
            .unwrap_or_else(|| "http://localhost:6334".to_string());
        let store = PersistentVectorStore::connect(&url, embeddings.dimension() as u64)
            .context("failed to connect to the persistent vector store")?;
        Ok(Arc::new(store))
    } else {
        Ok(EphemeralVectorStore::new())
    }
}

/// Builds the full dependency graph, mirroring how `codeprysm-cli`'s
/// `create_backend` assembles its backend from resolved config.
pub async fn build_stack(global: &GlobalOptions) -> Result<Stack> {
    let settings = load_settings(global)?;

    let repo_config = RepoManagerConfig {
        data_dir: settings.data_dir.clone(),
        max_repo_size_mb: settings.max_repo_size_mb,
        max_files: settings.max_files,
        clone_timeout_seconds: settings.clone_timeout_seconds,
        use_persistent_index: settings.use_persistent_index,
    };
    let repo_manager = Arc::new(
        RepositoryManager::new(repo_config).context("failed to initialize the repository manager")?,
    );

    let embeddings = build_embedding_chain(&settings);
    let chat = build_chat_chain(&settings);
    let store = build_vector_store(&settings, &embeddings)?;

    let indexer_config = IndexerConfig {
        data_dir: settings.data_dir.clone(),
        use_persistent_index: settings.use_persistent_index,
        batch_size: settings.index.batch_size,
        file_read_concurrency: settings.index.file_read_concurrency,
        max_index_files: settings.index.max_files,
        max_file_size_bytes: settings.index.max_file_size_kb * 1024,
        max_index_total_bytes: settings.index.max_total_mb * 1024 * 1024,
        max_chunks: settings.index.max_chunks,
        time_budget_seconds: settings.index.time_budget_seconds,
    };
    let indexer = Arc::new(Indexer::new(
        repo_manager.clone(),
        embeddings.clone(),
        store.clone(),
        indexer_config,
    ));

    let retriever = Arc::new(Retriever::new(embeddings.clone(), store.clone()));
    let orchestrator = Arc::new(Orchestrator::new(chat.clone(), retriever.clone(), repo_manager.clone()));

    Ok(Stack {
        settings,
        repo_manager,
        indexer,
        retriever,
        chat,
        orchestrator,
    })
}
