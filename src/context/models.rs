//! Data models for context optimization

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Importance band derived from a file's relevance score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Importance {
    /// score >= 30 critical, >= 20 high, >= 10 medium, else low
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 30 => Self::Critical,
            s if s >= 20 => Self::High,
            s if s >= 10 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// How aggressively files are cut from the ranked list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationStrategy {
    /// Top 5 files
    Minimal,
    /// Greedy fill of the token budget
    #[default]
    Smart,
    /// Top 50 files
    Full,
}

impl OptimizationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Smart => "smart",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for OptimizationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "smart" => Ok(Self::Smart),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown optimization strategy: {other}")),
        }
    }
}

/// Kind of declaration that opened a code section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Function,
    Class,
    Interface,
    Type,
    Variable,
    Import,
    Export,
}

/// A contiguous run of lines starting at a declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSection {
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: SectionKind,
    pub relevance_score: u32,
}

/// A scored project file selected for the LLM context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCandidate {
    /// Path relative to the project root
    pub path: PathBuf,
    pub score: u32,
    pub language: String,
    pub importance: Importance,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relevant_sections: Vec<CodeSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl FileCandidate {
    pub fn new(path: PathBuf, score: u32, language: impl Into<String>) -> Self {
        Self {
            path,
            score,
            language: language.into(),
            importance: Importance::from_score(score),
            relevant_sections: Vec::new(),
            summary: None,
        }
    }
}

/// Input to a single optimization call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequest {
    pub project_path: PathBuf,
    pub query: String,
    #[serde(default)]
    pub focus_area: Option<String>,
    pub token_budget: usize,
    #[serde(default)]
    pub strategy: OptimizationStrategy,
}

impl OptimizationRequest {
    pub fn new(project_path: impl Into<PathBuf>, query: impl Into<String>, token_budget: usize) -> Self {
        Self {
            project_path: project_path.into(),
            query: query.into(),
            focus_area: None,
            token_budget,
            strategy: OptimizationStrategy::default(),
        }
    }

    pub fn with_focus(mut self, focus_area: Option<String>) -> Self {
        self.focus_area = focus_area.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn with_strategy(mut self, strategy: OptimizationStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Result of an optimization call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedContext {
    pub project_path: PathBuf,
    pub query: String,
    pub focus_area: Option<String>,
    pub strategy: OptimizationStrategy,
    pub token_budget: usize,
    pub files: Vec<FileCandidate>,
    pub estimated_tokens: usize,
    pub files_scanned: usize,
}

impl OptimizedContext {
    /// A context with no files, used for direct questions
    pub fn empty(project_path: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            query: query.into(),
            focus_area: None,
            strategy: OptimizationStrategy::Minimal,
            token_budget: 0,
            files: Vec::new(),
            estimated_tokens: 0,
            files_scanned: 0,
        }
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| f.path.to_string_lossy().into_owned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_bands() {
        assert_eq!(Importance::from_score(45), Importance::Critical);
        assert_eq!(Importance::from_score(30), Importance::Critical);
        assert_eq!(Importance::from_score(29), Importance::High);
        assert_eq!(Importance::from_score(20), Importance::High);
        assert_eq!(Importance::from_score(10), Importance::Medium);
        assert_eq!(Importance::from_score(9), Importance::Low);
        assert_eq!(Importance::from_score(0), Importance::Low);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("FULL".parse::<OptimizationStrategy>(), Ok(OptimizationStrategy::Full));
        assert!("greedy".parse::<OptimizationStrategy>().is_err());
        assert_eq!(OptimizationStrategy::default(), OptimizationStrategy::Smart);
    }

    #[test]
    fn test_section_kind_serializes_as_type() {
        let section = CodeSection {
            start_line: 1,
            end_line: 2,
            content: "fn a() {}".to_string(),
            kind: SectionKind::Function,
            relevance_score: 1,
        };
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["startLine"], 1);
    }
}
