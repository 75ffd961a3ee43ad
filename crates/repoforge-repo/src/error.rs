//! Repository Manager error taxonomy (`spec.md` §7).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("invalid repository URL '{url}': {message}")]
    InvalidInput { url: String, message: String },

    #[error("repository exceeds size caps: {message}")]
    TooLarge { message: String },

    #[error("clone failed for '{url}': {message}")]
    CloneFailure { url: String, message: String },

    #[error("repository '{repo_id}' not found")]
    NotFound { repo_id: String },

    #[error("file '{path}' not found in repository '{repo_id}'")]
    FileNotFound { repo_id: String, path: String },

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("clone timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl RepoError {
    pub fn invalid_input(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn too_large(message: impl Into<String>) -> Self {
        Self::TooLarge {
            message: message.into(),
        }
    }

    pub fn clone_failure(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CloneFailure {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn not_found(repo_id: impl Into<String>) -> Self {
        Self::NotFound {
            repo_id: repo_id.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, RepoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_mentions_repo_id() {
        let err = RepoError::not_found("abc123");
        assert!(err.to_string().contains("abc123"));
    }
}
