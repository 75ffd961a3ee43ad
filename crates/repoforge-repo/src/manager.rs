//! Repository Manager (`spec.md` §4.2).
//!
//! Single-writer registry map guarded by a `tokio::sync::RwLock`, following
//! the teacher's `WorkspaceRegistry` composition shape
//! (`codeprysm_backend::registry`): external readers call [`get`] for
//! snapshots, mutations always go through [`update`].

use crate::error::{RepoError, Result};
use crate::filters::scan_filter;
use crate::ids::repo_id as compute_repo_id;
use crate::registry::{load_registry, persist_registry};
use crate::types::{FileInfo, RepoRecord, RepoStats};
use crate::url::parse_repo_url;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

/// Knobs the manager needs from [`repoforge_config::Settings`], duplicated
/// here rather than depending on the config crate directly (the manager
/// should be constructible with hand-picked values in tests too).
#[derive(Debug, Clone)]
pub struct RepoManagerConfig {
    pub data_dir: PathBuf,
    pub max_repo_size_mb: u64,
    pub max_files: usize,
    pub clone_timeout_seconds: u64,
    pub use_persistent_index: bool,
}

impl Default for RepoManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_repo_size_mb: 512,
            max_files: 10_000,
            clone_timeout_seconds: 900,
            use_persistent_index: false,
        }
    }
}

pub struct RepositoryManager {
    config: RepoManagerConfig,
    records: Arc<RwLock<HashMap<String, RepoRecord>>>,
    http: reqwest::Client,
}

impl RepositoryManager {
    pub fn new(config: RepoManagerConfig) -> Result<Self> {
        let records = load_registry(&config.data_dir, config.use_persistent_index)?;
        Ok(Self {
            config,
            records: Arc::new(RwLock::new(records)),
            http: reqwest::Client::new(),
        })
    }

    pub async fn get(&self, repo_id: &str) -> Option<RepoRecord> {
        self.records.read().await.get(repo_id).cloned()
    }

    /// Merge-update a record, serializing writes through the single lock
    /// (`spec.md` §5: "Mutations always acquired via `update`, which
    /// serializes writes and optionally persists").
    pub async fn update(
        &self,
        repo_id: &str,
        persist: bool,
        mutate: impl FnOnce(&mut RepoRecord),
    ) -> Result<()> {
        let mut guard = self.records.write().await;
        let record = guard
            .get_mut(repo_id)
            .ok_or_else(|| RepoError::not_found(repo_id))?;
        mutate(record);
        if persist {
            persist_registry(&self.config.data_dir, &guard)?;
        }
        Ok(())
    }

    pub async fn list_files(&self, repo_id: &str) -> Result<Vec<FileInfo>> {
        let record = self.get(repo_id).await.ok_or_else(|| RepoError::not_found(repo_id))?;
        scan_files(&record.local_path)
    }

    pub async fn read_file(&self, repo_id: &str, file_path: &str) -> Result<String> {
        let record = self.get(repo_id).await.ok_or_else(|| RepoError::not_found(repo_id))?;
        let full_path = record.local_path.join(file_path);
        let bytes = std::fs::read(&full_path).map_err(|e| RepoError::io(&full_path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Clone (or archive-download) a hosted repo, scan it, register it.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn load(&self, url: &str, branch: Option<&str>) -> Result<RepoRecord> {
        let parsed = parse_repo_url(url)?;
        let tmp_dir = unique_temp_dir(&self.config.data_dir, &parsed.repo_name);
        std::fs::create_dir_all(&tmp_dir).map_err(|e| RepoError::io(&tmp_dir, e))?;

        let clone_result = tokio::time::timeout(
            Duration::from_secs(self.config.clone_timeout_seconds),
            clone_or_download(&self.http, url, branch, &tmp_dir),
        )
        .await;

        let clone_outcome = match clone_result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                cleanup_dir(&tmp_dir);
                return Err(e);
            }
            Err(_) => {
                cleanup_dir(&tmp_dir);
                return Err(RepoError::Timeout {
                    seconds: self.config.clone_timeout_seconds,
                });
            }
        };

        let final_dir = self
            .config
            .data_dir
            .join(&parsed.repo_name)
            .join(&clone_outcome.commit_hash[..8.min(clone_outcome.commit_hash.len())]);
        move_into_place(&tmp_dir, &final_dir)?;
        strip_vcs_metadata(&final_dir);

        let stats = compute_stats(&final_dir)?;
        if stats.total_size_bytes > self.config.max_repo_size_mb * 1024 * 1024 {
            return Err(RepoError::too_large(format!(
                "{} bytes exceeds {}MB cap",
                stats.total_size_bytes, self.config.max_repo_size_mb
            )));
        }
        if stats.total_files > self.config.max_files {
            return Err(RepoError::too_large(format!(
                "{} files exceeds {} file cap",
                stats.total_files, self.config.max_files
            )));
        }

        let repo_id = compute_repo_id(&parsed.repo_name, &clone_outcome.commit_hash);
        let record = RepoRecord::new(
            repo_id.clone(),
            parsed.repo_name,
            url.to_string(),
            clone_outcome.commit_hash,
            clone_outcome.branch,
            final_dir,
            stats,
        );

        let mut guard = self.records.write().await;
        guard.insert(repo_id, record.clone());
        persist_registry(&self.config.data_dir, &guard)?;
        info!(repo_id = %record.repo_id, files = record.stats.total_files, "repository registered");
        Ok(record)
    }
}

struct CloneOutcome {
    commit_hash: String,
    branch: String,
}

fn unique_temp_dir(data_dir: &Path, repo_name: &str) -> PathBuf {
    use rand::Rng;
    let suffix: u64 = rand::thread_rng().gen();
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    data_dir
        .join("_tmp")
        .join(format!("{repo_name}-{ts}-{suffix:x}"))
}

fn cleared_proxy_env() -> Vec<(&'static str, &'static str)> {
    // Cleared rather than set: callers who need to unset an env var for a
    // child process pass an empty value only where the platform demands
    // one; here we simply omit them from the child's explicit env.
    vec![]
}

async fn clone_or_download(
    http: &reqwest::Client,
    url: &str,
    branch: Option<&str>,
    dest: &Path,
) -> Result<CloneOutcome> {
    match try_git_clone(url, branch, dest).await {
        Ok(outcome) => Ok(outcome),
        Err(RepoError::CloneFailure { message, .. }) if message.contains("git binary not found") => {
            warn!("git binary unavailable, falling back to archive download");
            download_archive(http, url, branch, dest).await
        }
        Err(e) => Err(e),
    }
}

async fn try_git_clone(url: &str, branch: Option<&str>, dest: &Path) -> Result<CloneOutcome> {
    use tokio::process::Command;

    let mut cmd = Command::new("git");
    cmd.arg("clone")
        .arg("--depth=1")
        .arg("--single-branch")
        .arg("--no-tags")
        .arg("--filter=blob:none");
    if let Some(b) = branch {
        cmd.arg("--branch").arg(b);
    }
    cmd.arg(url).arg(dest);
    cmd.env_remove("http_proxy")
        .env_remove("https_proxy")
        .env_remove("HTTP_PROXY")
        .env_remove("HTTPS_PROXY")
        .env_remove("ALL_PROXY")
        .env_remove("no_proxy");
    let _ = cleared_proxy_env();

    let output = cmd
        .output()
        .await
        .map_err(|e| RepoError::clone_failure(url, format!("git binary not found: {e}")))?;

    if !output.status.success() {
        return Err(RepoError::clone_failure(
            url,
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    rev_parse(dest).await
}

async fn rev_parse(repo_dir: &Path) -> Result<CloneOutcome> {
    use tokio::process::Command;

    let commit_output = Command::new("git")
        .arg("rev-parse")
        .arg("HEAD")
        .current_dir(repo_dir)
        .output()
        .await
        .map_err(|e| RepoError::clone_failure(repo_dir.display().to_string(), e.to_string()))?;
    let commit_hash = String::from_utf8_lossy(&commit_output.stdout).trim().to_string();

    let branch_output = Command::new("git")
        .arg("rev-parse")
        .arg("--abbrev-ref")
        .arg("HEAD")
        .current_dir(repo_dir)
        .output()
        .await
        .map_err(|e| RepoError::clone_failure(repo_dir.display().to_string(), e.to_string()))?;
    let branch = String::from_utf8_lossy(&branch_output.stdout).trim().to_string();

    Ok(CloneOutcome {
        commit_hash,
        branch: if branch.is_empty() { "main".to_string() } else { branch },
    })
}

/// Serverless-friendly fallback when the `git` binary is unavailable:
/// download the hosted archive over HTTPS and unzip it.
async fn download_archive(
    http: &reqwest::Client,
    url: &str,
    branch: Option<&str>,
    dest: &Path,
) -> Result<CloneOutcome> {
    let parsed = parse_repo_url(url)?;
    let branch_ref = branch.unwrap_or("HEAD");
    let archive_url = format!(
        "https://github.com/{}/{}/archive/{}.zip",
        parsed.owner, parsed.repo_name, branch_ref
    );

    let bytes = http
        .get(&archive_url)
        .send()
        .await
        .map_err(|e| RepoError::clone_failure(url, e.to_string()))?
        .bytes()
        .await
        .map_err(|e| RepoError::clone_failure(url, e.to_string()))?;

    let cursor = std::io::Cursor::new(bytes);
    let mut archive =
        zip::ZipArchive::new(cursor).map_err(|e| RepoError::clone_failure(url, e.to_string()))?;
    archive
        .extract(dest)
        .map_err(|e| RepoError::clone_failure(url, e.to_string()))?;

    // GitHub zips nest everything under a single top-level directory; flatten it.
    if let Some(entry) = std::fs::read_dir(dest)
        .map_err(|e| RepoError::io(dest, e))?
        .filter_map(|e| e.ok())
        .find(|e| e.path().is_dir())
    {
        let nested = entry.path();
        for child in std::fs::read_dir(&nested).map_err(|e| RepoError::io(&nested, e))? {
            let child = child.map_err(|e| RepoError::io(&nested, e))?;
            let target = dest.join(child.file_name());
            let _ = std::fs::rename(child.path(), target);
        }
        let _ = std::fs::remove_dir_all(&nested);
    }

    Ok(CloneOutcome {
        commit_hash: branch_ref.to_string(),
        branch: branch_ref.to_string(),
    })
}

/// Move `src` into `dest`, discarding `src` if `dest` already has content
/// (same commit cloned concurrently); falls back to a recursive copy that
/// skips `.git` when a plain rename fails (e.g. cross-filesystem).
fn move_into_place(src: &Path, dest: &Path) -> Result<()> {
    if dest.exists() && std::fs::read_dir(dest).map(|mut d| d.next().is_some()).unwrap_or(false) {
        cleanup_dir(src);
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RepoError::io(parent, e))?;
    }
    if std::fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    copy_tree_ignoring_vcs(src, dest)?;
    cleanup_dir(src);
    Ok(())
}

fn copy_tree_ignoring_vcs(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| RepoError::io(dest, e))?;
    for entry in walkdir::WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let rel = entry.path().strip_prefix(src).unwrap();
        if rel.components().next().map(|c| c.as_os_str() == ".git").unwrap_or(false) {
            continue;
        }
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| RepoError::io(&target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RepoError::io(parent, e))?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| RepoError::io(&target, e))?;
        }
    }
    Ok(())
}

fn strip_vcs_metadata(dir: &Path) {
    let git_dir = dir.join(".git");
    if git_dir.exists() {
        let _ = std::fs::remove_dir_all(&git_dir);
    }
}

/// Removes a temp directory with retries, chmod'ing read-only files back
/// to writable first (`spec.md` §4.2 step 3).
fn cleanup_dir(dir: &Path) {
    for attempt in 0..3 {
        make_writable_recursive(dir);
        if std::fs::remove_dir_all(dir).is_ok() {
            return;
        }
        if attempt < 2 {
            std::thread::sleep(Duration::from_millis(200));
        }
    }
}

fn make_writable_recursive(dir: &Path) {
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if let Ok(metadata) = entry.metadata() {
            let mut perms = metadata.permissions();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                perms.set_mode(perms.mode() | 0o200);
            }
            #[cfg(not(unix))]
            {
                perms.set_readonly(false);
            }
            let _ = std::fs::set_permissions(entry.path(), perms);
        }
    }
}

fn compute_stats(dir: &Path) -> Result<RepoStats> {
    let mut stats = RepoStats::default();
    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let Some((_, ext)) = scan_filter(rel) else {
            continue;
        };
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        stats.total_files += 1;
        stats.total_size_bytes += size;
        let lang = if ext.is_empty() { "text".to_string() } else { ext };
        *stats.languages.entry(lang).or_insert(0) += 1;
    }
    Ok(stats)
}

fn scan_files(dir: &Path) -> Result<Vec<FileInfo>> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let Some((rel_path, ext)) = scan_filter(rel) else {
            continue;
        };
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let language = if ext.is_empty() { "text".to_string() } else { ext };
        out.push(FileInfo {
            file_path: rel_path,
            size,
            language,
            estimated_tokens: (size / 4) as usize,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = RepositoryManager::new(RepoManagerConfig {
            data_dir: tmp.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        assert!(manager.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn update_missing_repo_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = RepositoryManager::new(RepoManagerConfig {
            data_dir: tmp.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        let result = manager.update("missing", false, |_| {}).await;
        assert!(result.is_err());
    }

    #[test]
    fn scan_files_skips_excluded_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("node_modules")).unwrap();
        std::fs::write(tmp.path().join("node_modules/pkg.js"), "x").unwrap();
        std::fs::write(tmp.path().join("main.rs"), "fn main() {}").unwrap();

        let files = scan_files(tmp.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_path, "main.rs");
    }

    #[test]
    fn compute_stats_counts_languages() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.rs"), "fn a() {}").unwrap();
        std::fs::write(tmp.path().join("b.rs"), "fn b() {}").unwrap();
        let stats = compute_stats(tmp.path()).unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.languages.get("rs"), Some(&2));
    }
}
