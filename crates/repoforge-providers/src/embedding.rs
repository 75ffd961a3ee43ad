//! Embedding provider trait (`spec.md` §4.1, embedding half).
//!
//! Mirrors the teacher's `codeprysm_search::embeddings::EmbeddingProvider`
//! shape (one async trait, a `ProviderStatus` health snapshot, a
//! `provider_type()` tag), generalized to the spec's four-tier priority
//! chain instead of the teacher's three concrete backends.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Priority-ordered embedding provider identity (`spec.md` §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderKind {
    Local,
    RemoteFree,
    RemotePaid,
    Mock,
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Local => "local",
            Self::RemoteFree => "remote-free",
            Self::RemotePaid => "remote-paid",
            Self::Mock => "mock",
        };
        write!(f, "{s}")
    }
}

/// Health/capability snapshot for diagnostics, analogous to the teacher's
/// `ProviderStatus`.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub available: bool,
    pub kind: EmbeddingProviderKind,
    pub dimension: usize,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl ProviderStatus {
    pub fn healthy(kind: EmbeddingProviderKind, dimension: usize) -> Self {
        Self {
            available: true,
            kind,
            dimension,
            latency_ms: None,
            error: None,
        }
    }

    pub fn unavailable(kind: EmbeddingProviderKind, error: impl Into<String>) -> Self {
        Self {
            available: false,
            kind,
            dimension: 0,
            latency_ms: None,
            error: Some(error.into()),
        }
    }
}

/// A single embedding backend. All embeddings produced by one provider
/// instance share `dimension()` (`spec.md` §4.1: "all embeddings in a
/// collection share one dimension, determined at init").
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts. Implementations that have a server-side
    /// batch-size limit must sub-batch internally.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Liveness probe used during provider selection; bounded to a few
    /// seconds by the caller.
    async fn check_status(&self) -> ProviderStatus;

    fn dimension(&self) -> usize;

    fn kind(&self) -> EmbeddingProviderKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_matches_spec_names() {
        assert_eq!(EmbeddingProviderKind::Local.to_string(), "local");
        assert_eq!(EmbeddingProviderKind::RemoteFree.to_string(), "remote-free");
        assert_eq!(EmbeddingProviderKind::RemotePaid.to_string(), "remote-paid");
        assert_eq!(EmbeddingProviderKind::Mock.to_string(), "mock");
    }
}
