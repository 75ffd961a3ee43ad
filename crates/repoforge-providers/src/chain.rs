//! Priority-ordered provider chains (`spec.md` §4.1, §9: "the
//! prioritization chain is data, not code — a list of adapters tried in
//! order").

use crate::chat::{ChatMessage, ChatOptions, ChatProvider, ChatProviderKind};
use crate::embedding::{EmbeddingProvider, EmbeddingProviderKind, ProviderStatus};
use crate::error::{ProviderError, Result};
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{info, warn};

/// Tries each embedding provider in priority order, falling back down the
/// chain on failure. The chain should always end with a
/// [`crate::mock::MockEmbeddingProvider`], which never errors.
pub struct EmbeddingChain {
    providers: Vec<Arc<dyn EmbeddingProvider>>,
}

impl EmbeddingChain {
    pub fn new(providers: Vec<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { providers }
    }

    /// Probes providers in order and returns the first whose liveness
    /// check succeeds (`spec.md` §4.1 selection rule). Does not affect
    /// subsequent [`Self::embed`] calls, which always retry the whole
    /// chain on failure regardless of which provider was last selected.
    pub async fn select_active(&self) -> Option<ProviderStatus> {
        for provider in &self.providers {
            let status = provider.check_status().await;
            if status.available {
                return Some(status);
            }
        }
        None
    }

    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut tried = Vec::new();
        for provider in &self.providers {
            match provider.embed(texts).await {
                Ok(vectors) => {
                    if tried.is_empty() {
                        info!(provider = %provider.kind(), "embedding served by primary provider");
                    } else {
                        warn!(provider = %provider.kind(), fallbacks = ?tried, "embedding served after fallback");
                    }
                    return Ok(vectors);
                }
                Err(err) => {
                    warn!(provider = %provider.kind(), error = %err, "embedding provider failed, falling back");
                    tried.push(provider.kind().to_string());
                }
            }
        }
        Err(ProviderError::AllProvidersFailed { tried })
    }

    pub fn dimension(&self) -> usize {
        self.providers
            .last()
            .map(|p| p.dimension())
            .unwrap_or(crate::mock::MOCK_EMBEDDING_DIM)
    }

    pub fn kinds(&self) -> Vec<EmbeddingProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }
}

/// Tries each chat provider in priority order unless `provider_override`
/// is set, in which case the override is used exactly with no fallback
/// (`spec.md` §4.1 contract #1).
pub struct ChatChain {
    providers: Vec<Arc<dyn ChatProvider>>,
}

impl ChatChain {
    pub fn new(providers: Vec<Arc<dyn ChatProvider>>) -> Self {
        Self { providers }
    }

    fn find(&self, kind: ChatProviderKind) -> Option<&Arc<dyn ChatProvider>> {
        self.providers.iter().find(|p| p.kind() == kind)
    }

    pub async fn complete(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        if let Some(kind) = options.provider_override {
            let provider = self
                .find(kind)
                .ok_or_else(|| ProviderError::unavailable(kind.to_string(), "not configured"))?;
            return provider.complete(messages, options).await;
        }

        let mut tried = Vec::new();
        for provider in &self.providers {
            match provider.complete(messages, options).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    warn!(provider = %provider.kind(), error = %err, "chat provider failed, falling back");
                    tried.push(provider.kind().to_string());
                }
            }
        }
        Err(ProviderError::AllProvidersFailed { tried })
    }

    pub async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<BoxStream<'static, Result<String>>> {
        if let Some(kind) = options.provider_override {
            let provider = self
                .find(kind)
                .ok_or_else(|| ProviderError::unavailable(kind.to_string(), "not configured"))?;
            return provider.stream(messages, options).await;
        }

        let mut tried = Vec::new();
        for provider in &self.providers {
            match provider.stream(messages, options).await {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    warn!(provider = %provider.kind(), error = %err, "chat stream provider failed, falling back");
                    tried.push(provider.kind().to_string());
                }
            }
        }
        Err(ProviderError::AllProvidersFailed { tried })
    }

    pub fn kinds(&self) -> Vec<ChatProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockChatProvider, MockEmbeddingProvider};

    struct AlwaysFailsEmbedding;

    #[async_trait::async_trait]
    impl EmbeddingProvider for AlwaysFailsEmbedding {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(ProviderError::request("flaky", "boom"))
        }
        async fn check_status(&self) -> ProviderStatus {
            ProviderStatus::unavailable(EmbeddingProviderKind::Local, "down")
        }
        fn dimension(&self) -> usize {
            384
        }
        fn kind(&self) -> EmbeddingProviderKind {
            EmbeddingProviderKind::Local
        }
    }

    #[tokio::test]
    async fn embedding_chain_falls_back_to_mock() {
        let chain = EmbeddingChain::new(vec![
            Arc::new(AlwaysFailsEmbedding),
            Arc::new(MockEmbeddingProvider::default()),
        ]);
        let out = chain.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn chat_chain_respects_override() {
        let chain = ChatChain::new(vec![Arc::new(MockChatProvider)]);
        let messages = vec![ChatMessage::user("hi")];
        let options = ChatOptions::default().with_override(ChatProviderKind::Mock);
        let response = chain.complete(&messages, &options).await.unwrap();
        assert!(response.contains("Mock response"));
    }

    #[tokio::test]
    async fn chat_chain_override_missing_provider_errors() {
        let chain = ChatChain::new(vec![Arc::new(MockChatProvider)]);
        let messages = vec![ChatMessage::user("hi")];
        let options = ChatOptions::default().with_override(ChatProviderKind::RemotePaid);
        let result = chain.complete(&messages, &options).await;
        assert!(result.is_err());
    }
}
