//! Agent-layer error taxonomy (`spec.md` §7). Per §7's local-recovery
//! policy, Generator/Answerer/Test Generator never propagate these —
//! they catch and embed error text in their result objects instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("repository '{repo_id}' not found")]
    RepoNotFound { repo_id: String },

    #[error("provider error: {0}")]
    Provider(#[from] repoforge_providers::ProviderError),

    #[error("index error: {0}")]
    Index(#[from] repoforge_index::IndexError),

    #[error("repository error: {0}")]
    Repo(#[from] repoforge_repo::RepoError),
}

impl AgentError {
    pub fn repo_not_found(repo_id: impl Into<String>) -> Self {
        Self::RepoNotFound {
            repo_id: repo_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
