//! Code search and file listing tools

use super::{ExecutionSpeed, TokenCost, Tool, ToolError, ToolOutput, ToolParams, ToolSpec};
use crate::context::file_scorer::language_for;
use crate::context::ProjectScanner;
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CODE_SEARCH: &str = "code_search";
pub const FILE_LIST: &str = "file_list";

const MIN_KEYWORD_LEN: usize = 3;
const MAX_LINE_CHARS: usize = 200;

/// One matching line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub file: String,
    pub line: usize,
    pub text: String,
}

/// Case-insensitive search over the project's scanned files
pub struct CodeSearchTool {
    spec: ToolSpec,
    max_results: usize,
}

impl CodeSearchTool {
    pub fn new(max_results: usize) -> Self {
        let spec = ToolSpec::new(CODE_SEARCH, "Search project source files for task keywords")
            .with_capabilities(["search", "find usages", "code navigation", "grep"])
            .with_token_cost(TokenCost::Low)
            .with_execution_time(ExecutionSpeed::Fast)
            .with_reliability(0.95);

        Self { spec, max_results }
    }

    /// Pattern matching any query keyword of three or more characters
    pub fn keyword_pattern(query: &str) -> Result<Regex, ToolError> {
        let keywords: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|k| k.chars().count() >= MIN_KEYWORD_LEN)
            .map(regex::escape)
            .collect();

        if keywords.is_empty() {
            return Err(ToolError::Invalid(format!("no searchable keywords in '{query}'")));
        }

        RegexBuilder::new(&keywords.join("|"))
            .case_insensitive(true)
            .build()
            .map_err(|e| ToolError::Invalid(e.to_string()))
    }

    /// Search with an explicit regex
    pub async fn search(&self, root: &Path, pattern: Regex) -> Result<Vec<SearchMatch>, ToolError> {
        let root = root.to_path_buf();
        let max_results = self.max_results;

        let matches = tokio::task::spawn_blocking(move || search_files(&root, &pattern, max_results))
            .await
            .map_err(|e| ToolError::Exec(format!("search task failed: {e}")))?;

        info!("Found {} matches", matches.len());
        Ok(matches)
    }
}

fn search_files(root: &Path, pattern: &Regex, max_results: usize) -> Vec<SearchMatch> {
    let scanner = ProjectScanner::new(root);
    let mut matches = Vec::new();

    for path in scanner.scan() {
        let Ok(content) = std::fs::read_to_string(&path) else {
            debug!("Skipping unreadable file {}", path.display());
            continue;
        };
        let file = scanner.relative(&path).to_string_lossy().into_owned();

        for (idx, line) in content.lines().enumerate() {
            if !pattern.is_match(line) {
                continue;
            }
            matches.push(SearchMatch {
                file: file.clone(),
                line: idx + 1,
                text: line.trim().chars().take(MAX_LINE_CHARS).collect(),
            });
            if matches.len() >= max_results {
                return matches;
            }
        }
    }

    matches
}

#[async_trait]
impl Tool for CodeSearchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolOutput, ToolError> {
        let pattern = Self::keyword_pattern(&params.query)?;
        let matches = self.search(&params.project_path, pattern).await?;

        let data = json!({
            "total": matches.len(),
            "matches": matches,
        });
        Ok(ToolOutput::new(data))
    }
}

/// Lists the files context assembly would consider
pub struct FileListTool {
    spec: ToolSpec,
}

impl FileListTool {
    pub fn new() -> Self {
        let spec = ToolSpec::new(FILE_LIST, "List supported project files with their language")
            .with_capabilities(["list files", "project structure", "inventory"])
            .with_token_cost(TokenCost::Low)
            .with_execution_time(ExecutionSpeed::Fast)
            .with_reliability(0.99);

        Self { spec }
    }
}

impl Default for FileListTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FileListTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolOutput, ToolError> {
        let scanner = ProjectScanner::new(&params.project_path);
        let walker = scanner.clone();
        let paths: Vec<PathBuf> = tokio::task::spawn_blocking(move || walker.scan())
            .await
            .map_err(|e| ToolError::Exec(format!("scan task failed: {e}")))?;

        let files: Vec<_> = paths
            .iter()
            .map(|p| {
                let relative = scanner.relative(p);
                json!({
                    "path": relative,
                    "language": language_for(&relative),
                })
            })
            .collect();

        Ok(ToolOutput::new(json!({ "total": files.len(), "files": files })))
    }
}
