//! Deterministic repository identifiers (`spec.md` §3).

use sha2::{Digest, Sha256};

/// `repo_id = sha256(repo_name + ":" + commit_hash[:8])[:12]`.
pub fn repo_id(repo_name: &str, commit_hash: &str) -> String {
    let short_commit: String = commit_hash.chars().take(8).collect();
    let mut hasher = Sha256::new();
    hasher.update(repo_name.as_bytes());
    hasher.update(b":");
    hasher.update(short_commit.as_bytes());
    let digest = hasher.finalize();
    format!("{digest:x}")[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_id_is_12_hex_chars() {
        let id = repo_id("Hello-World", "7fd1a60b01f91b314f59955a4e4d4e80d8edf11");
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn repo_id_is_deterministic() {
        let a = repo_id("repo", "abcdef1234567890");
        let b = repo_id("repo", "abcdef1234567890");
        assert_eq!(a, b);
    }

    #[test]
    fn repo_id_uses_only_first_8_commit_chars() {
        let a = repo_id("repo", "abcdef12XXXXXXXX");
        let b = repo_id("repo", "abcdef12YYYYYYYY");
        assert_eq!(a, b);
    }
}
