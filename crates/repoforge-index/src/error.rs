//! Indexing/retrieval error taxonomy (`spec.md` §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("repository '{repo_id}' not found")]
    RepoNotFound { repo_id: String },

    #[error("collection for repository '{repo_id}' not found")]
    CollectionNotFound { repo_id: String },

    #[error("embedding provider error: {0}")]
    Embedding(#[from] repoforge_providers::ProviderError),

    #[error("repository manager error: {0}")]
    Repo(#[from] repoforge_repo::RepoError),

    #[error("vector store error: {message}")]
    VectorStore { message: String },

    #[error("sidecar i/o error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sidecar serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    pub fn repo_not_found(repo_id: impl Into<String>) -> Self {
        Self::RepoNotFound {
            repo_id: repo_id.into(),
        }
    }

    pub fn collection_not_found(repo_id: impl Into<String>) -> Self {
        Self::CollectionNotFound {
            repo_id: repo_id.into(),
        }
    }

    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStore {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
