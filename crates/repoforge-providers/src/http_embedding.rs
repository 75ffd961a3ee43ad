//! HTTP-backed embedding provider shared by the local, remote-free and
//! remote-paid tiers (`spec.md` §4.1). A single generic struct covers all
//! three because they differ only in endpoint, auth, sub-batching and
//! pacing — "the prioritization chain is data, not code" (`spec.md` §9).

use crate::embedding::{EmbeddingProvider, EmbeddingProviderKind, ProviderStatus};
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub kind: EmbeddingProviderKind,
    /// `Some(20)` for the remote-free tier (`spec.md` §4.1: "sub-batched at
    /// ≤20"); `None` means send the whole batch at once.
    pub sub_batch_size: Option<usize>,
    /// `Some(1.5s)` for the remote-free tier's pacing between sub-batches.
    pub pacing: Option<Duration>,
    pub max_retries: u32,
    pub liveness_timeout: Duration,
}

impl HttpEmbeddingConfig {
    pub fn remote_free(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            model: "remote-free-embedding".to_string(),
            dimension: 768,
            kind: EmbeddingProviderKind::RemoteFree,
            sub_batch_size: Some(20),
            pacing: Some(Duration::from_millis(1500)),
            max_retries: 3,
            liveness_timeout: Duration::from_secs(3),
        }
    }

    pub fn remote_paid(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            model: "remote-paid-embedding".to_string(),
            dimension: 1536,
            kind: EmbeddingProviderKind::RemotePaid,
            sub_batch_size: None,
            pacing: None,
            max_retries: 1,
            liveness_timeout: Duration::from_secs(3),
        }
    }

    pub fn local(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: "local-embedding".to_string(),
            dimension: 384,
            kind: EmbeddingProviderKind::Local,
            sub_batch_size: None,
            pacing: None,
            max_retries: 1,
            liveness_timeout: Duration::from_secs(3),
        }
    }
}

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    config: HttpEmbeddingConfig,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    pub fn new(config: HttpEmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn provider_name(&self) -> String {
        self.config.kind.to_string()
    }

    async fn embed_sub_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let name = self.provider_name();
        let mut attempt = 0;
        loop {
            let mut request = self
                .client
                .post(format!("{}/embeddings", self.config.base_url))
                .json(&serde_json::json!({ "model": self.config.model, "input": texts }));
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ProviderError::request(&name, e.to_string()))?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.config.max_retries {
                    return Err(ProviderError::rate_limited(&name, None));
                }
                let retry_after_ms = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|secs| secs * 1000)
                    .unwrap_or(1500);
                warn!(provider = %name, retry_after_ms, "embedding provider rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
                attempt += 1;
                continue;
            }

            if !response.status().is_success() {
                let status = response.status();
                if attempt < 1 {
                    attempt += 1;
                    continue;
                }
                return Err(ProviderError::request(
                    &name,
                    format!("HTTP {status}"),
                ));
            }

            let parsed: EmbedResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::parse(&name, e.to_string()))?;
            return Ok(parsed.data.into_iter().map(|d| d.embedding).collect());
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let Some(batch_size) = self.config.sub_batch_size else {
            return self.embed_sub_batch(texts).await;
        };

        let mut all = Vec::with_capacity(texts.len());
        for (i, chunk) in texts.chunks(batch_size).enumerate() {
            if i > 0 {
                if let Some(pacing) = self.config.pacing {
                    tokio::time::sleep(pacing).await;
                }
            }
            let mut embedded = self.embed_sub_batch(chunk).await?;
            all.append(&mut embedded);
        }
        Ok(all)
    }

    async fn check_status(&self) -> ProviderStatus {
        let name = self.provider_name();
        let start = std::time::Instant::now();
        let result = tokio::time::timeout(
            self.config.liveness_timeout,
            self.client
                .get(format!("{}/health", self.config.base_url))
                .send(),
        )
        .await;

        match result {
            Ok(Ok(response)) if response.status().is_success() => {
                let latency_ms = start.elapsed().as_millis() as u64;
                debug!(provider = %name, latency_ms, "embedding provider liveness probe succeeded");
                ProviderStatus::healthy(self.config.kind, self.config.dimension)
                    .with_latency(latency_ms)
            }
            Ok(Ok(response)) => {
                ProviderStatus::unavailable(self.config.kind, format!("HTTP {}", response.status()))
            }
            Ok(Err(e)) => ProviderStatus::unavailable(self.config.kind, e.to_string()),
            Err(_) => ProviderStatus::unavailable(self.config.kind, "liveness probe timed out"),
        }
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn kind(&self) -> EmbeddingProviderKind {
        self.config.kind
    }
}

impl ProviderStatus {
    pub(crate) fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embeds_single_batch_successfully() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2]}, {"embedding": [0.3, 0.4]}]
            })))
            .mount(&server)
            .await;

        let config = HttpEmbeddingConfig::remote_paid(server.uri(), None);
        let provider = HttpEmbeddingProvider::new(config);
        let out = provider
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn sub_batches_large_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [1.0]}]
            })))
            .mount(&server)
            .await;

        let mut config = HttpEmbeddingConfig::remote_free(server.uri(), None);
        config.pacing = Some(Duration::from_millis(1));
        let provider = HttpEmbeddingProvider::new(config);
        let texts: Vec<String> = (0..45).map(|i| i.to_string()).collect();
        let out = provider.embed(&texts).await.unwrap();
        // 3 sub-batches of <=20 each, 1 embedding returned per call.
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn liveness_probe_reports_unavailable_on_failure() {
        let config = HttpEmbeddingConfig::local("http://127.0.0.1:1");
        let provider = HttpEmbeddingProvider::new(config);
        let status = provider.check_status().await;
        assert!(!status.available);
    }
}
