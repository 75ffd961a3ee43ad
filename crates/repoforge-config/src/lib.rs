//! Repoforge configuration management.
//!
//! Configuration is environment-variable driven (`spec.md` §6 is the
//! canonical option table); an optional `repoforge.toml` file in the
//! working directory may supply the same fields at lower priority, purely
//! as a local-development convenience. Precedence: defaults → TOML file →
//! environment variables.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root settings object threaded through the composition root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub max_repo_size_mb: u64,
    pub max_files: usize,
    pub clone_timeout_seconds: u64,
    pub index: IndexSettings,
    pub use_persistent_index: bool,
    pub providers: ProviderSettings,
    pub server: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_repo_size_mb: 512,
            max_files: 10_000,
            clone_timeout_seconds: 900,
            index: IndexSettings::default(),
            use_persistent_index: false,
            providers: ProviderSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub batch_size: usize,
    pub file_read_concurrency: usize,
    pub max_files: usize,
    pub max_file_size_kb: u64,
    pub max_total_mb: u64,
    pub max_chunks: usize,
    pub time_budget_seconds: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            batch_size: 250,
            file_read_concurrency: 32,
            max_files: 900,
            max_file_size_kb: 256,
            max_total_mb: 20,
            max_chunks: 2500,
            time_budget_seconds: 55,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderSettings {
    pub local_embedding_endpoint: Option<String>,
    pub remote_free_embedding_endpoint: Option<String>,
    pub remote_free_embedding_key_env: Option<String>,
    pub remote_paid_embedding_endpoint: Option<String>,
    pub remote_paid_embedding_key_env: Option<String>,
    pub chat_local_base_url: Option<String>,
    pub chat_remote_paid_base_url: Option<String>,
    pub chat_remote_paid_key_env: Option<String>,
    pub chat_remote_free_base_url: Option<String>,
    pub chat_remote_free_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub host: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Settings {
    /// Validate invariants that are cheap to check eagerly (cf. spec.md §6:
    /// "the binary must perform a pre-flight check and fail fast").
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_repo_size_mb == 0 {
            return Err(ConfigError::invalid_value(
                "max_repo_size_mb",
                "must be greater than zero",
            ));
        }
        if self.max_files == 0 {
            return Err(ConfigError::invalid_value(
                "max_files",
                "must be greater than zero",
            ));
        }
        if self.index.max_chunks == 0 {
            return Err(ConfigError::invalid_value(
                "index.max_chunks",
                "must be greater than zero",
            ));
        }
        if self.index.time_budget_seconds == 0 {
            return Err(ConfigError::invalid_value(
                "index.time_budget_seconds",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let settings = Settings::default();
        assert_eq!(settings.data_dir, PathBuf::from("./data"));
        assert_eq!(settings.max_repo_size_mb, 512);
        assert_eq!(settings.max_files, 10_000);
        assert_eq!(settings.clone_timeout_seconds, 900);
        assert_eq!(settings.index.batch_size, 250);
        assert_eq!(settings.index.file_read_concurrency, 32);
        assert_eq!(settings.index.max_files, 900);
        assert_eq!(settings.index.max_file_size_kb, 256);
        assert_eq!(settings.index.max_total_mb, 20);
        assert_eq!(settings.index.max_chunks, 2500);
        assert_eq!(settings.index.time_budget_seconds, 55);
        assert!(!settings.use_persistent_index);
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn validate_rejects_zero_caps() {
        let mut settings = Settings::default();
        settings.max_files = 0;
        assert!(settings.validate().is_err());
    }
}
