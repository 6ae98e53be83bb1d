//! Static project analysis: tree rendering, duplicate detection and
//! configuration scanning

use super::{ExecutionSpeed, TokenCost, Tool, ToolError, ToolOutput, ToolParams, ToolSpec};
use crate::context::scanner::is_ignored_dir_name;
use crate::context::ProjectScanner;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

pub const PROJECT_TREE: &str = "project_tree";
pub const DUPLICATE_FINDER: &str = "duplicate_finder";
pub const CONFIG_SCANNER: &str = "config_scanner";

const MAX_DUPLICATE_GROUPS: usize = 50;

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir() && is_ignored_dir_name(&entry.file_name().to_string_lossy())
}

async fn blocking<T, F>(f: F) -> Result<T, ToolError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::Exec(format!("analysis task failed: {e}")))
}

// ---------------------------------------------------------------------------
// Project tree
// ---------------------------------------------------------------------------

/// Rendered directory tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTree {
    pub tree: String,
    pub directories: usize,
    pub files: usize,
}

/// Depth-limited directory tree, skipping hidden and build directories
pub struct ProjectTreeTool {
    spec: ToolSpec,
    max_depth: usize,
}

impl ProjectTreeTool {
    pub fn new(max_depth: usize) -> Self {
        let spec = ToolSpec::new(PROJECT_TREE, "Render the project directory structure")
            .with_capabilities(["project structure", "architecture", "directory layout", "overview"])
            .with_token_cost(TokenCost::Low)
            .with_execution_time(ExecutionSpeed::Fast)
            .with_reliability(0.99);

        Self { spec, max_depth }
    }

    pub fn render(root: &Path, max_depth: usize) -> ProjectTree {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        let mut lines = vec![format!("{name}/")];
        let mut directories = 0;
        let mut files = 0;

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e));

        for entry in walker.filter_map(|e| e.ok()) {
            let indent = "  ".repeat(entry.depth());
            let entry_name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() {
                directories += 1;
                lines.push(format!("{indent}{entry_name}/"));
            } else {
                files += 1;
                lines.push(format!("{indent}{entry_name}"));
            }
        }

        ProjectTree {
            tree: lines.join("\n"),
            directories,
            files,
        }
    }
}

#[async_trait]
impl Tool for ProjectTreeTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolOutput, ToolError> {
        if !params.project_path.is_dir() {
            return Err(ToolError::Invalid(format!(
                "not a directory: {}",
                params.project_path.display()
            )));
        }
        let root = params.project_path.clone();
        let max_depth = self.max_depth;
        let tree = blocking(move || Self::render(&root, max_depth)).await?;
        Ok(ToolOutput::new(serde_json::to_value(tree)?))
    }
}

// ---------------------------------------------------------------------------
// Duplicate finder
// ---------------------------------------------------------------------------

/// Location of a duplicated window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLocation {
    pub file: String,
    pub line: usize,
}

/// Identical normalized windows found in more than one place
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub hash: String,
    pub lines: usize,
    pub snippet: String,
    pub occurrences: Vec<CodeLocation>,
}

/// Hashes sliding windows of normalized source lines
pub struct DuplicateFinderTool {
    spec: ToolSpec,
    window: usize,
}

impl DuplicateFinderTool {
    pub fn new(window: usize) -> Self {
        let spec = ToolSpec::new(DUPLICATE_FINDER, "Find duplicated blocks of code across files")
            .with_capabilities(["duplicates", "duplicate code", "refactor", "code smell", "dry"])
            .with_token_cost(TokenCost::Medium)
            .with_execution_time(ExecutionSpeed::Medium)
            .with_reliability(0.9);

        Self {
            spec,
            window: window.max(2),
        }
    }

    /// Duplicate groups, most frequent first
    pub fn find(root: &Path, window: usize) -> Vec<DuplicateGroup> {
        let scanner = ProjectScanner::new(root);
        let mut seen: HashMap<[u8; 32], (String, Vec<CodeLocation>)> = HashMap::new();

        for path in scanner.scan() {
            if !is_code_file(&path) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let file = scanner.relative(&path).to_string_lossy().into_owned();
            let lines = normalized_lines(&content);
            if lines.len() < window {
                continue;
            }

            // windows overlapping the previous repeat in this file are skipped
            let mut next_free = 0;
            for start in 0..=lines.len() - window {
                if start < next_free {
                    continue;
                }
                let block: Vec<&str> = lines[start..start + window].iter().map(|(_, l)| *l).collect();
                let joined = block.join("\n");
                let digest: [u8; 32] = Sha256::digest(joined.as_bytes()).into();

                let entry = seen.entry(digest).or_insert_with(|| (joined, Vec::new()));
                let is_repeat = !entry.1.is_empty();
                entry.1.push(CodeLocation {
                    file: file.clone(),
                    line: lines[start].0,
                });
                if is_repeat {
                    next_free = start + window;
                }
            }
        }

        let mut groups: Vec<DuplicateGroup> = seen
            .into_iter()
            .filter(|(_, (_, locations))| locations.len() > 1)
            .map(|(digest, (snippet, occurrences))| DuplicateGroup {
                hash: hex::encode(&digest[..6]),
                lines: window,
                snippet,
                occurrences,
            })
            .collect();

        groups.sort_by(|a, b| {
            b.occurrences
                .len()
                .cmp(&a.occurrences.len())
                .then_with(|| a.occurrences[0].file.cmp(&b.occurrences[0].file))
                .then_with(|| a.occurrences[0].line.cmp(&b.occurrences[0].line))
        });
        groups.truncate(MAX_DUPLICATE_GROUPS);
        debug!("Found {} duplicate groups", groups.len());
        groups
    }
}

fn is_code_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ts" | "tsx" | "js" | "jsx" | "py" | "go" | "rs" | "java")
    )
}

/// Trimmed non-blank, non-comment lines with their 1-based line numbers
fn normalized_lines(content: &str) -> Vec<(usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| {
            !line.is_empty()
                && !line.starts_with("//")
                && !line.starts_with('#')
                && !line.starts_with('*')
                && !line.starts_with("/*")
                && *line != "}"
                && *line != "{"
        })
        .collect()
}

#[async_trait]
impl Tool for DuplicateFinderTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolOutput, ToolError> {
        let root = params.project_path.clone();
        let window = self.window;
        let groups = blocking(move || Self::find(&root, window)).await?;

        info!("Duplicate scan found {} groups", groups.len());
        Ok(ToolOutput::new(json!({
            "totalGroups": groups.len(),
            "duplicates": groups,
        })))
    }
}

// ---------------------------------------------------------------------------
// Configuration scanner
// ---------------------------------------------------------------------------

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:process\.env\.([A-Z][A-Z0-9_]*)|process\.env\[['"]([A-Z][A-Z0-9_]*)['"]\]|env::var\("([A-Z][A-Z0-9_]*)"\)|os\.environ(?:\.get)?[\[(]['"]([A-Z][A-Z0-9_]*)['"]|os\.getenv\(['"]([A-Z][A-Z0-9_]*)['"]|os\.Getenv\("([A-Z][A-Z0-9_]*)"\))"#,
    )
    .expect("invalid regex")
});

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s'"`)<>]+"#).expect("invalid regex"));

const CONFIG_FILE_NAMES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "config.json",
    "config.yaml",
    "config.yml",
    "settings.json",
    "docker-compose.yml",
    "docker-compose.yaml",
    "Cargo.toml",
    "pyproject.toml",
];

/// Hard-coded URL occurrence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlUsage {
    pub file: String,
    pub line: usize,
    pub url: String,
}

/// Scattered configuration found in a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReport {
    pub config_files: Vec<String>,
    /// Environment variable name to the places reading it
    pub env_vars: BTreeMap<String, Vec<CodeLocation>>,
    pub hardcoded_urls: Vec<UrlUsage>,
    pub suggestions: Vec<String>,
}

/// Locates config files, env-var reads and hard-coded URLs
pub struct ConfigScannerTool {
    spec: ToolSpec,
}

impl ConfigScannerTool {
    pub fn new() -> Self {
        let spec = ToolSpec::new(
            CONFIG_SCANNER,
            "Find configuration files, environment variable usage and hard-coded URLs",
        )
        .with_capabilities(["configuration", "config", "environment variables", "centralize"])
        .with_token_cost(TokenCost::Low)
        .with_execution_time(ExecutionSpeed::Fast)
        .with_reliability(0.95);

        Self { spec }
    }

    pub fn scan(root: &Path) -> ConfigReport {
        let mut report = ConfigReport::default();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e));
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if is_config_file_name(&name) {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                report.config_files.push(relative.to_string_lossy().into_owned());
            }
        }

        let scanner = ProjectScanner::new(root);
        for path in scanner.scan() {
            if !is_code_file(&path) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let file = scanner.relative(&path).to_string_lossy().into_owned();

            for (idx, line) in content.lines().enumerate() {
                for caps in ENV_VAR_PATTERN.captures_iter(line) {
                    if let Some(name) = caps.iter().skip(1).flatten().next() {
                        report
                            .env_vars
                            .entry(name.as_str().to_string())
                            .or_default()
                            .push(CodeLocation {
                                file: file.clone(),
                                line: idx + 1,
                            });
                    }
                }
                for url in URL_PATTERN.find_iter(line) {
                    report.hardcoded_urls.push(UrlUsage {
                        file: file.clone(),
                        line: idx + 1,
                        url: url.as_str().to_string(),
                    });
                }
            }
        }

        report.suggestions = suggestions(&report);
        report
    }
}

impl Default for ConfigScannerTool {
    fn default() -> Self {
        Self::new()
    }
}

fn is_config_file_name(name: &str) -> bool {
    name.starts_with(".env")
        || CONFIG_FILE_NAMES.contains(&name)
        || name.contains(".config.")
}

fn suggestions(report: &ConfigReport) -> Vec<String> {
    let mut suggestions = Vec::new();

    let scattered: Vec<&String> = report
        .env_vars
        .iter()
        .filter(|(_, locations)| {
            let mut files: Vec<&str> = locations.iter().map(|l| l.file.as_str()).collect();
            files.sort_unstable();
            files.dedup();
            files.len() > 1
        })
        .map(|(name, _)| name)
        .collect();
    if !scattered.is_empty() {
        suggestions.push(format!(
            "Read {} from a single config module instead of {} separate call sites",
            scattered.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "),
            scattered
                .iter()
                .map(|name| report.env_vars[*name].len())
                .sum::<usize>()
        ));
    }

    if !report.hardcoded_urls.is_empty() {
        suggestions.push(format!(
            "Move {} hard-coded URL(s) into configuration",
            report.hardcoded_urls.len()
        ));
    }

    if !report.env_vars.is_empty() && !report.config_files.iter().any(|f| f.contains(".env")) {
        suggestions.push("Add a .env.example documenting the required environment variables".to_string());
    }

    suggestions
}

#[async_trait]
impl Tool for ConfigScannerTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolOutput, ToolError> {
        let root = params.project_path.clone();
        let report = blocking(move || Self::scan(&root)).await?;
        Ok(ToolOutput::new(serde_json::to_value(report)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const BLOCK: &str = "\
const total = items.reduce((a, b) => a + b.price, 0);
const tax = total * rate;
const shipping = total > 100 ? 0 : 10;
const discount = applyCoupon(total, coupon);
const grand = total + tax + shipping - discount;
return { total, tax, shipping, discount, grand };
";

    #[test]
    fn test_tree_skips_ignored_and_limits_depth() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a/b/deep.ts", "x");
        write(dir.path(), "src/index.ts", "x");
        write(dir.path(), "node_modules/pkg/index.js", "x");

        let tree = ProjectTreeTool::render(dir.path(), 2);
        assert!(tree.tree.contains("  src/"));
        assert!(tree.tree.contains("    index.ts"));
        assert!(tree.tree.contains("    a/"));
        assert!(!tree.tree.contains("deep.ts"));
        assert!(!tree.tree.contains("node_modules"));
        assert_eq!(tree.files, 1);
        assert_eq!(tree.directories, 2);
    }

    #[test]
    fn test_duplicates_across_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/cart.ts", &format!("function cart() {{\n{BLOCK}}}\n"));
        write(dir.path(), "src/checkout.ts", &format!("// checkout\nfunction checkout() {{\n{BLOCK}}}\n"));
        write(dir.path(), "src/other.ts", "export const unrelated = 1;\n");

        let groups = DuplicateFinderTool::find(dir.path(), 6);
        assert_eq!(groups.len(), 1);

        let files: Vec<&str> = groups[0].occurrences.iter().map(|l| l.file.as_str()).collect();
        assert_eq!(files, vec!["src/cart.ts", "src/checkout.ts"]);
        assert_eq!(groups[0].occurrences[0].line, 2);
        assert_eq!(groups[0].occurrences[1].line, 3);
    }

    #[test]
    fn test_no_duplicates_in_small_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.ts", "const a = 1;\n");
        write(dir.path(), "b.ts", "const a = 1;\n");
        assert!(DuplicateFinderTool::find(dir.path(), 6).is_empty());
    }

    #[test]
    fn test_config_scan() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".env", "API_URL=x\n");
        write(dir.path(), "package.json", "{}");
        write(
            dir.path(),
            "src/client.ts",
            "const base = process.env.API_URL;\nfetch('https://api.example.com/v1/users');\n",
        );
        write(dir.path(), "src/server.ts", "const port = process.env['PORT'];\nconst u = process.env.API_URL;\n");
        write(dir.path(), "scripts/job.py", "import os\nkey = os.getenv('SECRET_KEY')\n");

        let report = ConfigScannerTool::scan(dir.path());
        assert_eq!(report.config_files, vec![".env", "package.json"]);
        assert_eq!(
            report.env_vars.keys().collect::<Vec<_>>(),
            vec!["API_URL", "PORT", "SECRET_KEY"]
        );
        assert_eq!(report.env_vars["API_URL"].len(), 2);
        assert_eq!(report.hardcoded_urls.len(), 1);
        assert_eq!(report.hardcoded_urls[0].url, "https://api.example.com/v1/users");
        assert!(report.suggestions.iter().any(|s| s.contains("API_URL")));
    }
}
