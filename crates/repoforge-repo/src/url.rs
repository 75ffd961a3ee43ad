//! Hosted-repo URL parsing (`spec.md` §4.2 step 1), grounded on
//! `original_source/backend/app/services/repo_manager.py`'s URL-to-
//! `(owner, repo_name)` regexes.

use crate::error::{RepoError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static HTTPS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.)?[\w.-]+/([\w.-]+)/([\w.-]+?)(?:\.git)?/?$").unwrap()
});
static SSH_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^git@[\w.-]+:([\w.-]+)/([\w.-]+?)(?:\.git)?$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRepoUrl {
    pub owner: String,
    pub repo_name: String,
}

/// Parses a hosted-repo URL in HTTPS or SSH form into `(owner, repo_name)`
/// (`spec.md` §4.2: "reject unparseable URLs with a clone error"). A bare
/// local directory path is accepted verbatim with `owner = "local"`.
pub fn parse_repo_url(url: &str) -> Result<ParsedRepoUrl> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(RepoError::invalid_input(url, "empty URL"));
    }

    if let Some(caps) = HTTPS_URL.captures(trimmed) {
        return Ok(ParsedRepoUrl {
            owner: caps[1].to_string(),
            repo_name: caps[2].to_string(),
        });
    }
    if let Some(caps) = SSH_URL.captures(trimmed) {
        return Ok(ParsedRepoUrl {
            owner: caps[1].to_string(),
            repo_name: caps[2].to_string(),
        });
    }

    let path = std::path::Path::new(trimmed);
    if path.is_dir() {
        let repo_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("local-repo")
            .to_string();
        return Ok(ParsedRepoUrl {
            owner: "local".to_string(),
            repo_name,
        });
    }

    Err(RepoError::invalid_input(
        url,
        "not a recognized hosted-repo URL or existing local directory",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_url() {
        let parsed = parse_repo_url("https://github.com/octocat/Hello-World").unwrap();
        assert_eq!(parsed.owner, "octocat");
        assert_eq!(parsed.repo_name, "Hello-World");
    }

    #[test]
    fn parses_https_url_with_git_suffix() {
        let parsed = parse_repo_url("https://github.com/octocat/Hello-World.git").unwrap();
        assert_eq!(parsed.repo_name, "Hello-World");
    }

    #[test]
    fn parses_ssh_url() {
        let parsed = parse_repo_url("git@github.com:octocat/Hello-World.git").unwrap();
        assert_eq!(parsed.owner, "octocat");
        assert_eq!(parsed.repo_name, "Hello-World");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_repo_url("not a url at all").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(parse_repo_url("").is_err());
    }
}
