//! Deterministic mock providers — the last link in both fallback chains
//! (`spec.md` §4.1) and the backbone of every test in this workspace that
//! must not touch the network.

use crate::chat::{single_chunk_stream, ChatMessage, ChatOptions, ChatProvider, ChatProviderKind};
use crate::embedding::{EmbeddingProvider, EmbeddingProviderKind, ProviderStatus};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Default dimension for the mock embedder; arbitrary but stable.
pub const MOCK_EMBEDDING_DIM: usize = 256;

/// CRC32-hash-into-buckets-with-sign, then L2-normalize (`spec.md` §4.1:
/// "hash tokens via CRC32 into a fixed-dimension vector using the sign
/// trick, then L2-normalize"). Pure function so property tests (§8.7,
/// "same input -> byte-equal vectors") can call it directly.
pub fn mock_embed_one(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0f32; dim];
    for token in text.split_whitespace() {
        let hash = crc32fast::hash(token.as_bytes());
        let idx = (hash as usize) % dim;
        let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dim: usize,
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self {
            dim: MOCK_EMBEDDING_DIM,
        }
    }
}

impl MockEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| mock_embed_one(t, self.dim)).collect())
    }

    async fn check_status(&self) -> ProviderStatus {
        ProviderStatus::healthy(EmbeddingProviderKind::Mock, self.dim)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn kind(&self) -> EmbeddingProviderKind {
        EmbeddingProviderKind::Mock
    }
}

/// Deterministic chat "completion": never calls out, never errors (it is
/// the terminal link of the fallback chain), and produces stable output
/// for identical input so orchestrator-level tests are reproducible.
#[derive(Debug, Clone, Default)]
pub struct MockChatProvider;

impl MockChatProvider {
    fn canned_response(messages: &[ChatMessage], options: &ChatOptions) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::chat::ChatRole::User))
            .map(|m| m.content.as_str())
            .unwrap_or("");

        if options.json_mode {
            let escaped = last_user.replace('"', "'");
            format!(
                "{{\"answer\": \"Mock answer for: {escaped}\", \"citations\": [], \"confidence\": \"low\", \"assumptions\": [\"mock provider\"]}}"
            )
        } else {
            format!("Mock response to: {last_user}")
        }
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    async fn complete(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        Ok(Self::canned_response(messages, options))
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<BoxStream<'static, Result<String>>> {
        Ok(single_chunk_stream(Self::canned_response(
            messages, options,
        )))
    }

    fn kind(&self) -> ChatProviderKind {
        ChatProviderKind::Mock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_embed_is_deterministic() {
        let a = mock_embed_one("fn main() { println!(\"hi\"); }", 128);
        let b = mock_embed_one("fn main() { println!(\"hi\"); }", 128);
        assert_eq!(a, b);
    }

    #[test]
    fn mock_embed_is_l2_normalized() {
        let v = mock_embed_one("alpha beta gamma delta", 64);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5 || norm == 0.0);
    }

    #[tokio::test]
    async fn mock_embedding_provider_embeds_batch() {
        let provider = MockEmbeddingProvider::default();
        let out = provider
            .embed(&["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), MOCK_EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn mock_chat_json_mode_is_valid_json() {
        let provider = MockChatProvider;
        let messages = vec![ChatMessage::user("what does this repo do?")];
        let response = provider
            .complete(&messages, &ChatOptions::json_mode())
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(parsed["confidence"], "low");
    }
}
