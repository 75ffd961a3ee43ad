//! Loads [`Settings`] from an optional TOML file overlaid with environment
//! variables, following `spec.md` §6's option table.

use crate::error::ConfigError;
use crate::Settings;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads and merges configuration from file + environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { file_path: None }
    }

    /// Point the loader at an explicit TOML file (mainly for tests).
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Load settings: defaults → `repoforge.toml` (if present) → env vars.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let mut settings = match &self.file_path {
            Some(path) if path.exists() => load_toml(path)?,
            Some(_) => Settings::default(),
            None => {
                let default_path = Path::new("repoforge.toml");
                if default_path.exists() {
                    load_toml(default_path)?
                } else {
                    Settings::default()
                }
            }
        };

        apply_env(&mut settings)?;
        settings.validate()?;
        Ok(settings)
    }
}

fn load_toml(path: &Path) -> Result<Settings, ConfigError> {
    debug!(?path, "loading repoforge config file");
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env_string(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid_env(name, format!("could not parse '{raw}'"))),
        None => Ok(None),
    }
}

/// Apply the `spec.md` §6 environment variables over whatever the file (or
/// defaults) supplied. Every variable is optional.
fn apply_env(settings: &mut Settings) -> Result<(), ConfigError> {
    if let Some(v) = env_string("DATA_DIR") {
        settings.data_dir = PathBuf::from(v);
    }
    if let Some(v) = env_parsed("MAX_REPO_SIZE_MB")? {
        settings.max_repo_size_mb = v;
    }
    if let Some(v) = env_parsed("MAX_FILES")? {
        settings.max_files = v;
    }
    if let Some(v) = env_parsed("CLONE_TIMEOUT_SECONDS")? {
        settings.clone_timeout_seconds = v;
    }
    if let Some(v) = env_parsed("INDEX_BATCH_SIZE")? {
        settings.index.batch_size = v;
    }
    if let Some(v) = env_parsed("FILE_READ_CONCURRENCY")? {
        settings.index.file_read_concurrency = v;
    }
    if let Some(v) = env_parsed("INDEX_MAX_FILES")? {
        settings.index.max_files = v;
    }
    if let Some(v) = env_parsed("INDEX_MAX_FILE_SIZE_KB")? {
        settings.index.max_file_size_kb = v;
    }
    if let Some(v) = env_parsed("INDEX_MAX_TOTAL_MB")? {
        settings.index.max_total_mb = v;
    }
    if let Some(v) = env_parsed("INDEX_MAX_CHUNKS")? {
        settings.index.max_chunks = v;
    }
    if let Some(v) = env_parsed("INDEX_TIME_BUDGET_SECONDS")? {
        settings.index.time_budget_seconds = v;
    }
    if let Some(v) = env_parsed("USE_PERSISTENT_INDEX")? {
        settings.use_persistent_index = v;
    }
    if let Some(v) = env_parsed("PORT")? {
        settings.server.port = v;
    }
    if let Some(v) = env_string("HOST") {
        settings.server.host = v;
    }

    if let Some(v) = env_string("LOCAL_EMBEDDING_ENDPOINT") {
        settings.providers.local_embedding_endpoint = Some(v);
    }
    if let Some(v) = env_string("REMOTE_FREE_EMBEDDING_ENDPOINT") {
        settings.providers.remote_free_embedding_endpoint = Some(v);
    }
    if let Some(v) = env_string("REMOTE_FREE_EMBEDDING_KEY_ENV") {
        settings.providers.remote_free_embedding_key_env = Some(v);
    }
    if let Some(v) = env_string("REMOTE_PAID_EMBEDDING_ENDPOINT") {
        settings.providers.remote_paid_embedding_endpoint = Some(v);
    }
    if let Some(v) = env_string("REMOTE_PAID_EMBEDDING_KEY_ENV") {
        settings.providers.remote_paid_embedding_key_env = Some(v);
    }
    if let Some(v) = env_string("CHAT_LOCAL_BASE_URL") {
        settings.providers.chat_local_base_url = Some(v);
    }
    if let Some(v) = env_string("CHAT_REMOTE_PAID_BASE_URL") {
        settings.providers.chat_remote_paid_base_url = Some(v);
    }
    if let Some(v) = env_string("CHAT_REMOTE_PAID_KEY_ENV") {
        settings.providers.chat_remote_paid_key_env = Some(v);
    }
    if let Some(v) = env_string("CHAT_REMOTE_FREE_BASE_URL") {
        settings.providers.chat_remote_free_base_url = Some(v);
    }
    if let Some(v) = env_string("CHAT_REMOTE_FREE_KEY_ENV") {
        settings.providers.chat_remote_free_key_env = Some(v);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable mutation must be serialized across tests in this process.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn file_then_env_precedence() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repoforge.toml");
        std::fs::write(&path, "max_files = 42\n").unwrap();

        env::set_var("MAX_FILES", "99");
        let settings = ConfigLoader::new().with_file(&path).load().unwrap();
        env::remove_var("MAX_FILES");

        // Env wins over the file.
        assert_eq!(settings.max_files, 99);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let settings = ConfigLoader::new()
            .with_file("/nonexistent/repoforge.toml")
            .load()
            .unwrap();
        assert_eq!(settings.max_files, 10_000);
    }

    #[test]
    fn invalid_env_value_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("MAX_FILES", "not-a-number");
        let result = ConfigLoader::new()
            .with_file("/nonexistent/repoforge.toml")
            .load();
        env::remove_var("MAX_FILES");
        assert!(result.is_err());
    }
}
