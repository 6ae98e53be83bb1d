//! Selection data model

use crate::bundles::Bundle;
use crate::tools::ToolSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// What a condition inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    CodebaseSize,
    Language,
    Framework,
    TaskType,
    Context,
    Custom,
}

/// How a condition compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    MatchesRegex,
}

/// String or numeric operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(f64),
    Text(String),
}

impl ConditionValue {
    /// Numeric view; non-numeric text is NaN
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for ConditionValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Weighted predicate attached to a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub operator: Operator,
    pub value: ConditionValue,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Condition {
    pub fn new(
        condition_type: ConditionType,
        operator: Operator,
        value: impl Into<ConditionValue>,
        weight: f64,
    ) -> Self {
        Self {
            condition_type,
            operator,
            value: value.into(),
            weight,
        }
    }
}

/// Project characteristics supplied with a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodebaseContext {
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub primary_languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub complexity: String,
}

/// Input to every selection call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionContext {
    pub task: String,
    pub project_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codebase_context: Option<CodebaseContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization: Option<Value>,
}

impl SelectionContext {
    pub fn new(task: impl Into<String>, project_path: impl Into<PathBuf>) -> Self {
        Self {
            task: task.into(),
            project_path: project_path.into(),
            codebase_context: None,
            optimization: None,
        }
    }

    pub fn with_codebase(mut self, codebase: CodebaseContext) -> Self {
        self.codebase_context = Some(codebase);
        self
    }

    pub fn with_optimization(mut self, optimization: Value) -> Self {
        self.optimization = Some(optimization);
        self
    }
}

/// Selection path chosen for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    ClaudeDirect,
    BundleFirst,
    ToolFirst,
    Hybrid,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeDirect => "claude-direct",
            Self::BundleFirst => "bundle-first",
            Self::ToolFirst => "tool-first",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Tool,
    Bundle,
}

/// One entry of a dependency-ordered plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Bundle id or tool name
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub can_run_in_parallel: bool,
    /// Position after dependency resolution
    pub order: usize,
}

/// Bundles and tools chosen for a task, with their plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
    pub selected_bundles: Vec<Bundle>,
    pub selected_tools: Vec<ToolSpec>,
    pub execution_plan: Vec<ExecutionStep>,
    pub reasoning: String,
    pub total_token_cost: u32,
    /// Seconds
    pub estimated_time: u64,
}

impl SelectionResult {
    pub fn empty(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selected_bundles.is_empty() && self.selected_tools.is_empty()
    }

    pub fn bundle_ids(&self) -> Vec<&str> {
        self.selected_bundles.iter().map(|b| b.id.as_str()).collect()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.selected_tools.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Selection plus the strategy that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedSelectionResult {
    #[serde(flatten)]
    pub selection: SelectionResult,
    pub selection_strategy: SelectionStrategy,
    /// In [0, 1]
    pub confidence: f64,
    pub recommendations: Vec<String>,
}
