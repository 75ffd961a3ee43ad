//! File filtering shared by scan and `list_files` (`spec.md` §4.2).

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::Path;

static INCLUDED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // source
        "py", "js", "ts", "jsx", "tsx", "java", "go", "rs", "rb", "c", "cpp", "cc", "cxx", "h",
        "hpp", "cs", "swift", "kt", "scala", "php", "pl", "lua", "sh", "bash", "zsh", "ps1",
        "psm1", // web
        "html", "css", "scss", "sass", "vue", // config / data
        "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "xml", // docs
        "md", "rst", "txt", "adoc",
    ]
    .into_iter()
    .collect()
});

static INCLUDED_FILENAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "Dockerfile",
        "Makefile",
        "Rakefile",
        "Gemfile",
        ".gitignore",
        ".gitattributes",
        ".env.example",
        ".env.sample",
    ]
    .into_iter()
    .collect()
});

static EXCLUDED_DIRS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        ".git",
        ".hg",
        ".svn",
        "node_modules",
        "vendor",
        "venv",
        ".venv",
        "env",
        "__pycache__",
        ".pytest_cache",
        ".mypy_cache",
        "target",
        "build",
        "dist",
        "out",
        ".idea",
        ".vscode",
        ".vs",
        ".settings",
        ".DS_Store",
    ]
    .into_iter()
    .collect()
});

static EXCLUDED_FILES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "package-lock.json",
        "yarn.lock",
        "pnpm-lock.yaml",
        "Cargo.lock",
        "poetry.lock",
        "Gemfile.lock",
        ".DS_Store",
        "Thumbs.db",
    ]
    .into_iter()
    .collect()
});

fn is_excluded_dir(name: &str) -> bool {
    let lower = name.to_lowercase();
    EXCLUDED_DIRS.contains(lower.as_str()) || lower.ends_with(".egg-info")
}

/// Returns `true` if any ancestor directory component of `rel_path` is
/// excluded.
pub fn path_under_excluded_dir(rel_path: &Path) -> bool {
    rel_path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .any(is_excluded_dir)
}

fn is_included_file(file_name: &str) -> bool {
    if INCLUDED_FILENAMES.contains(file_name) {
        return true;
    }
    if EXCLUDED_FILES.contains(file_name) {
        return false;
    }
    match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) => INCLUDED_EXTENSIONS.contains(ext.to_lowercase().as_str()),
        None => false,
    }
}

/// Evaluates a single directory-walk entry against the scan filter,
/// returning the repo-relative forward-slash path and normalized
/// extension when it should be kept.
pub fn scan_filter(rel_path: &Path) -> Option<(String, String)> {
    if path_under_excluded_dir(rel_path) {
        return None;
    }
    let file_name = rel_path.file_name()?.to_str()?;
    if !is_included_file(file_name) {
        return None;
    }
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let forward_slash_path = rel_path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect::<Vec<_>>()
        .join("/");
    Some((forward_slash_path, ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_source_file() {
        let (path, ext) = scan_filter(Path::new("src/main.rs")).unwrap();
        assert_eq!(path, "src/main.rs");
        assert_eq!(ext, "rs");
    }

    #[test]
    fn rejects_file_under_node_modules() {
        assert!(scan_filter(Path::new("node_modules/left-pad/index.js")).is_none());
    }

    #[test]
    fn rejects_lock_files() {
        assert!(scan_filter(Path::new("Cargo.lock")).is_none());
    }

    #[test]
    fn accepts_dockerfile_with_no_extension() {
        assert!(scan_filter(Path::new("Dockerfile")).is_some());
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(scan_filter(Path::new("archive.bin")).is_none());
    }
}
