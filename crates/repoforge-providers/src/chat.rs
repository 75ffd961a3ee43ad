//! Chat-completion provider trait (`spec.md` §4.1, chat half).
//!
//! The teacher repo has no chat-completion abstraction (only embeddings);
//! this is grounded on `original_source/backend/app/utils/llm.py`'s
//! `chat_completion`/`stream` surface, shaped as an `async_trait` sibling
//! to [`crate::embedding::EmbeddingProvider`] so both capabilities compose
//! the same way in the provider chain (`spec.md` §9: "providers form a
//! capability set `{embed, complete, stream}`").

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Priority-ordered chat provider identity (`spec.md` §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatProviderKind {
    /// Smallest local tier, used by the Router for cheap classification.
    LocalRouter,
    /// Local tier "A" (small).
    LocalA,
    /// Local tier "B" (larger).
    LocalB,
    RemotePaid,
    RemoteFree,
    Mock,
}

impl std::fmt::Display for ChatProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LocalRouter => "local-router",
            Self::LocalA => "local-a",
            Self::LocalB => "local-b",
            Self::RemotePaid => "remote-paid",
            Self::RemoteFree => "remote-free",
            Self::Mock => "mock",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Call options (`spec.md` §4.1: "`complete(messages, {temperature,
/// json_mode, max_tokens, provider_override})`").
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub json_mode: bool,
    pub max_tokens: Option<u32>,
    /// When set, the chain must respect it exactly and never fall back
    /// (`spec.md` §4.1 contract #1).
    pub provider_override: Option<ChatProviderKind>,
}

impl ChatOptions {
    pub fn json_mode() -> Self {
        Self {
            json_mode: true,
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_override(mut self, kind: ChatProviderKind) -> Self {
        self.provider_override = Some(kind);
        self
    }
}

/// A single chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String>;

    /// Streams partial text fragments. A provider without native streaming
    /// support degrades to a single final chunk (`spec.md` §4.1 contract
    /// #3), which [`crate::mock::MockChatProvider`] and any simple HTTP
    /// adapter without SSE support does by default via
    /// [`crate::chat::single_chunk_stream`].
    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<BoxStream<'static, Result<String>>>;

    fn kind(&self) -> ChatProviderKind;
}

/// Helper for providers that cannot stream: wraps one final string into a
/// one-item stream.
pub fn single_chunk_stream(text: String) -> BoxStream<'static, Result<String>> {
    Box::pin(tokio_stream::once(Ok(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn kind_display_matches_spec_names() {
        assert_eq!(ChatProviderKind::LocalA.to_string(), "local-a");
        assert_eq!(ChatProviderKind::RemotePaid.to_string(), "remote-paid");
    }

    #[tokio::test]
    async fn single_chunk_stream_yields_one_item() {
        let mut stream = single_chunk_stream("hello".to_string());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "hello");
        assert!(stream.next().await.is_none());
    }
}
