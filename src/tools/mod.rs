//! Tool abstractions: metadata, the executable trait and the registry

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::context::ContextOptimizer;
use crate::selection::SelectionContext;

pub mod analysis;
pub mod context;
pub mod quality;
pub mod search;

/// Relative token cost of running a tool or bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenCost {
    Low,
    #[default]
    Medium,
    High,
}

impl TokenCost {
    /// Weight used when summing plan costs: low=1, medium=3, high=5
    pub fn weight(&self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 3,
            Self::High => 5,
        }
    }
}

/// Expected wall-clock class of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionSpeed {
    Fast,
    #[default]
    Medium,
    Slow,
}

/// Serializable tool metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub token_cost: TokenCost,
    #[serde(default)]
    pub execution_time: ExecutionSpeed,
    /// Names of tools that must run first
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_parallelizable")]
    pub parallelizable: bool,
    /// Historical success ratio in [0, 1]
    #[serde(default = "default_reliability")]
    pub reliability: f64,
}

fn default_parallelizable() -> bool {
    true
}

fn default_reliability() -> f64 {
    0.9
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: BTreeSet::new(),
            token_cost: TokenCost::default(),
            execution_time: ExecutionSpeed::default(),
            dependencies: Vec::new(),
            parallelizable: default_parallelizable(),
            reliability: default_reliability(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_token_cost(mut self, cost: TokenCost) -> Self {
        self.token_cost = cost;
        self
    }

    pub fn with_execution_time(mut self, speed: ExecutionSpeed) -> Self {
        self.execution_time = speed;
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallelizable = false;
        self
    }

    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = reliability.clamp(0.0, 1.0);
        self
    }

    /// Heuristic relevance of this tool to a task description.
    ///
    /// Each capability phrase found in the task adds 2, each name token of
    /// three or more characters adds 1; the sum is scaled by reliability.
    pub fn relevance_to(&self, task: &str) -> f64 {
        let task = task.to_lowercase();
        let mut score = 0.0;

        for capability in &self.capabilities {
            let phrase = capability.to_lowercase().replace(['_', '-'], " ");
            if !phrase.trim().is_empty() && task.contains(phrase.trim()) {
                score += 2.0;
            }
        }

        for token in self.name.to_lowercase().split(['_', '-']) {
            if token.len() >= 3 && task.contains(token) {
                score += 1.0;
            }
        }

        score * self.reliability
    }
}

/// Parameters handed to every tool invocation
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolParams {
    pub project_path: PathBuf,
    pub query: String,
}

impl ToolParams {
    pub fn new(project_path: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            query: query.into(),
        }
    }
}

/// Result payload of a tool, with optional self-reported accounting
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

impl ToolOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            tokens_used: None,
            relevance: None,
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance = Some(relevance);
        self
    }
}

/// Tool execution errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Execution error: {0}")]
    Exec(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Tool unavailable: {0}")]
    Unavailable(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An invocable capability
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static metadata; `spec().name` must be unique within a registry
    fn spec(&self) -> &ToolSpec;

    fn name(&self) -> &str {
        &self.spec().name
    }

    /// Run the tool against a project
    async fn execute(&self, params: &ToolParams) -> Result<ToolOutput, ToolError>;

    /// Relevance of this tool for a selection context, used to rank
    /// individually-selected tools
    fn assess(&self, context: &SelectionContext) -> Result<f64, ToolError> {
        Ok(self.spec().relevance_to(&context.task))
    }
}

/// Tool registry keyed by name, in registration order
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec().clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Build the built-in tool set
pub fn default_tools(config: &Config, optimizer: Arc<ContextOptimizer>) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();

    tools.push(Arc::new(context::ContextOptimizerTool::new(
        optimizer,
        config.context.default_token_budget,
    )));

    tools.push(Arc::new(search::CodeSearchTool::new(
        config.execution.search_max_results,
    )));
    tools.push(Arc::new(search::FileListTool::new()));

    tools.push(Arc::new(analysis::ProjectTreeTool::new(
        config.execution.tree_max_depth,
    )));
    tools.push(Arc::new(analysis::DuplicateFinderTool::new(
        config.execution.duplicate_window_lines,
    )));
    tools.push(Arc::new(analysis::ConfigScannerTool::new()));

    tools.push(Arc::new(quality::CommandTool::type_check(
        config.execution.compile_timeout(),
    )));
    tools.push(Arc::new(quality::CommandTool::lint_check(
        config.execution.compile_timeout(),
    )));
    tools.push(Arc::new(quality::CommandTool::test_runner(
        config.execution.test_timeout(),
    )));

    info!("Initialized {} tools", tools.len());

    tools
}
