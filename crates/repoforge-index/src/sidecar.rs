//! Index metadata sidecar (`spec.md` §3, §6): `<data_dir>/_indexes/<repo_id>/_index_meta.json`.

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSidecar {
    pub commit_hash: String,
    pub chunk_count: usize,
    pub indexed_at: chrono::DateTime<chrono::Utc>,
}

fn sidecar_dir(data_dir: &Path, repo_id: &str) -> PathBuf {
    data_dir.join("_indexes").join(repo_id)
}

fn sidecar_path(data_dir: &Path, repo_id: &str) -> PathBuf {
    sidecar_dir(data_dir, repo_id).join("_index_meta.json")
}

pub fn read_sidecar(data_dir: &Path, repo_id: &str) -> Result<Option<IndexSidecar>> {
    let path = sidecar_path(data_dir, repo_id);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|e| IndexError::io(&path, e))?;
    Ok(Some(serde_json::from_str(&content)?))
}

pub fn write_sidecar(data_dir: &Path, repo_id: &str, sidecar: &IndexSidecar) -> Result<()> {
    let dir = sidecar_dir(data_dir, repo_id);
    std::fs::create_dir_all(&dir).map_err(|e| IndexError::io(&dir, e))?;
    let path = sidecar_path(data_dir, repo_id);
    let content = serde_json::to_string_pretty(sidecar)?;
    std::fs::write(&path, content).map_err(|e| IndexError::io(&path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let sidecar = IndexSidecar {
            commit_hash: "abc".into(),
            chunk_count: 10,
            indexed_at: chrono::Utc::now(),
        };
        write_sidecar(tmp.path(), "repo1", &sidecar).unwrap();
        let loaded = read_sidecar(tmp.path(), "repo1").unwrap().unwrap();
        assert_eq!(loaded, sidecar);
    }

    #[test]
    fn missing_sidecar_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_sidecar(tmp.path(), "missing").unwrap().is_none());
    }
}
