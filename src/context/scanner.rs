//! Project file enumeration

use glob::Pattern;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Extensions considered for context assembly
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "py", "go", "rs", "java", "md", "txt", "json", "yaml", "yml",
];

/// Dependency, build and version-control directories
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "out",
    "target",
    "coverage",
    "vendor",
    "__pycache__",
    ".git",
    ".svn",
    ".hg",
    ".next",
];

const MAX_FILE_SIZE_BYTES: u64 = 1024 * 1024;

static NOISE_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    ["*.min.*", "*.map", "*.lock", "package-lock.json"]
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect()
});

/// Walks a project directory collecting candidate source files
#[derive(Debug, Clone)]
pub struct ProjectScanner {
    root: PathBuf,
}

impl ProjectScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute-or-root-joined paths of supported files, sorted by name.
    ///
    /// An unreadable or missing root yields an empty list.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !Self::is_excluded_dir(entry));

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    if e.depth() == 0 {
                        warn!("Cannot read project directory {}: {}", self.root.display(), e);
                    } else {
                        debug!("Skipping unreadable entry: {}", e);
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();

            if let Ok(meta) = entry.metadata() {
                if meta.len() > MAX_FILE_SIZE_BYTES {
                    debug!("Skipping large file {} ({} bytes)", path.display(), meta.len());
                    continue;
                }
            }

            if Self::is_noise_file(path) || !Self::is_supported(path) {
                continue;
            }

            files.push(path.to_path_buf());
        }

        debug!("Scanned {} files under {}", files.len(), self.root.display());
        files
    }

    /// Path relative to the scan root
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn is_noise_file(path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return true;
        };
        NOISE_PATTERNS.iter().any(|p| p.matches(name))
    }

    fn is_excluded_dir(entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        is_ignored_dir_name(&entry.file_name().to_string_lossy())
    }
}

/// Hidden, dependency, build and version-control directory names
pub fn is_ignored_dir_name(name: &str) -> bool {
    name.starts_with('.') || EXCLUDED_DIRS.contains(&name)
}

/// Path rendered for scoring: root-relative, forward slashes, leading '/'
pub fn scoring_path(relative: &Path) -> String {
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_filters_dirs_and_noise() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/index.ts", "export const a = 1;");
        touch(dir.path(), "src/app.min.js", "x");
        touch(dir.path(), "src/app.js.map", "x");
        touch(dir.path(), "node_modules/lib/index.js", "x");
        touch(dir.path(), ".git/config.json", "{}");
        touch(dir.path(), "dist/bundle.js", "x");
        touch(dir.path(), "README.md", "# readme");
        touch(dir.path(), "image.png", "x");

        let scanner = ProjectScanner::new(dir.path());
        let files: Vec<String> = scanner
            .scan()
            .iter()
            .map(|p| scoring_path(&scanner.relative(p)))
            .collect();

        assert_eq!(files, vec!["/README.md", "/src/index.ts"]);
    }

    #[test]
    fn test_missing_root_yields_empty() {
        let scanner = ProjectScanner::new("/definitely/not/a/real/project/root");
        assert!(scanner.scan().is_empty());
    }

    #[test]
    fn test_scoring_path() {
        assert_eq!(scoring_path(Path::new("src/api/x.ts")), "/src/api/x.ts");
        assert_eq!(scoring_path(Path::new("x.ts")), "/x.ts");
    }
}
