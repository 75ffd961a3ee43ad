//! Provider error taxonomy (`spec.md` §7: `ProviderError`, `Timeout`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("provider {provider} rate-limited; retry after {retry_after_ms:?}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: Option<u64>,
    },

    #[error("provider {provider} timed out after {elapsed_ms}ms")]
    Timeout { provider: String, elapsed_ms: u64 },

    #[error("provider {provider} returned an unparsable response: {message}")]
    Parse { provider: String, message: String },

    #[error("provider {provider} is unavailable: {message}")]
    Unavailable { provider: String, message: String },

    #[error("no provider in the fallback chain succeeded (tried: {tried:?})")]
    AllProvidersFailed { tried: Vec<String> },
}

impl ProviderError {
    pub fn request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn rate_limited(provider: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            retry_after_ms,
        }
    }

    pub fn timeout(provider: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            provider: provider.into(),
            elapsed_ms,
        }
    }

    pub fn parse(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_provider_name() {
        let err = ProviderError::timeout("remote-paid", 3000);
        assert!(err.to_string().contains("remote-paid"));
        assert!(err.to_string().contains("3000"));
    }
}
