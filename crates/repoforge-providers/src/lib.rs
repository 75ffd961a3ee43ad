//! Provider adapters: a unified interface over multiple embedding and
//! chat-completion backends, with streaming, JSON mode, retry/backoff and
//! a deterministic mock (`spec.md` §4.1).
//!
//! ```ignore
//! use repoforge_providers::{EmbeddingChain, MockEmbeddingProvider};
//! use std::sync::Arc;
//!
//! let chain = EmbeddingChain::new(vec![Arc::new(MockEmbeddingProvider::default())]);
//! ```

mod chain;
mod chat;
mod embedding;
mod error;
mod http_chat;
mod http_embedding;
mod mock;

pub use chain::{ChatChain, EmbeddingChain};
pub use chat::{
    single_chunk_stream, ChatMessage, ChatOptions, ChatProvider, ChatProviderKind, ChatRole,
};
pub use embedding::{EmbeddingProvider, EmbeddingProviderKind, ProviderStatus};
pub use error::{ProviderError, Result};
pub use http_chat::{drain_sse_lines, HttpChatConfig, HttpChatProvider};
pub use http_embedding::{HttpEmbeddingConfig, HttpEmbeddingProvider};
pub use mock::{mock_embed_one, MockChatProvider, MockEmbeddingProvider, MOCK_EMBEDDING_DIM};
