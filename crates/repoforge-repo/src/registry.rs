//! Persistent registry (`spec.md` §4.2, §6: `<data_dir>/repo_registry.json`).

use crate::error::{RepoError, Result};
use crate::types::RepoRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const REGISTRY_FILE_NAME: &str = "repo_registry.json";

pub fn registry_path(data_dir: &Path) -> PathBuf {
    data_dir.join(REGISTRY_FILE_NAME)
}

/// Loads the registry file, dropping entries whose `local_path` no longer
/// exists, and resetting indexed state for ephemeral vector stores
/// (`spec.md` §4.2, §3).
pub fn load_registry(
    data_dir: &Path,
    use_persistent_index: bool,
) -> Result<HashMap<String, RepoRecord>> {
    let path = registry_path(data_dir);
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = std::fs::read_to_string(&path).map_err(|e| RepoError::io(&path, e))?;
    let mut records: HashMap<String, RepoRecord> = serde_json::from_str(&content)?;

    records.retain(|repo_id, record| {
        let exists = record.local_path.exists();
        if !exists {
            warn!(repo_id, path = %record.local_path.display(), "dropping registry entry with missing local_path");
        }
        exists
    });

    if !use_persistent_index {
        for record in records.values_mut() {
            record.reset_for_ephemeral_rehydrate();
        }
    }

    info!(count = records.len(), "registry rehydrated");
    Ok(records)
}

/// Persists the registry file as a single JSON object (`repo_id -> record`).
pub fn persist_registry(data_dir: &Path, records: &HashMap<String, RepoRecord>) -> Result<()> {
    std::fs::create_dir_all(data_dir).map_err(|e| RepoError::io(data_dir, e))?;
    let path = registry_path(data_dir);
    let content = serde_json::to_string_pretty(records)?;
    std::fs::write(&path, content).map_err(|e| RepoError::io(&path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepoStats;

    fn sample_record(local_path: PathBuf) -> RepoRecord {
        RepoRecord::new(
            "abc123456789".into(),
            "repo".into(),
            "https://github.com/owner/repo".into(),
            "deadbeef".into(),
            "main".into(),
            local_path,
            RepoStats::default(),
        )
    }

    #[test]
    fn persist_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("repo");
        std::fs::create_dir_all(&local).unwrap();

        let mut records = HashMap::new();
        let record = sample_record(local.clone());
        records.insert(record.repo_id.clone(), record.clone());

        persist_registry(tmp.path(), &records).unwrap();
        let loaded = load_registry(tmp.path(), true).unwrap();

        assert_eq!(loaded.get(&record.repo_id), Some(&record));
    }

    #[test]
    fn missing_local_path_is_dropped_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("gone");

        let mut records = HashMap::new();
        let record = sample_record(missing);
        records.insert(record.repo_id.clone(), record);

        persist_registry(tmp.path(), &records).unwrap();
        let loaded = load_registry(tmp.path(), true).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn ephemeral_mode_resets_indexed_state() {
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("repo");
        std::fs::create_dir_all(&local).unwrap();

        let mut records = HashMap::new();
        let mut record = sample_record(local);
        record.indexed = true;
        record.chunk_count = 5;
        records.insert(record.repo_id.clone(), record.clone());

        persist_registry(tmp.path(), &records).unwrap();
        let loaded = load_registry(tmp.path(), false).unwrap();
        assert!(!loaded[&record.repo_id].indexed);
    }
}
