//! Plan execution with per-tool failure isolation

use crate::bundles::{BundleRegistry, ExecutionOrder};
use crate::error::panic_message;
use crate::metrics::Metrics;
use crate::selection::{dependency_order, Dependent, ExecutionStep, SelectionContext, StepKind};
use crate::tools::{Tool, ToolParams};
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of a single tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool: String,
    pub success: bool,
    pub data: Value,
    pub tokens_used: u64,
    pub execution_time_ms: u64,
    pub relevance_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate over the successful results of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledResult {
    pub tools_used: Vec<String>,
    pub total_tokens: u64,
    pub average_relevance: f64,
    pub successes: usize,
    pub failures: usize,
    pub total_time_ms: u64,
}

impl CompiledResult {
    pub fn compile(results: &[ToolResult]) -> Self {
        let succeeded: Vec<&ToolResult> = results.iter().filter(|r| r.success).collect();

        let average_relevance = if succeeded.is_empty() {
            0.0
        } else {
            succeeded.iter().map(|r| r.relevance_score).sum::<f64>() / succeeded.len() as f64
        };

        Self {
            tools_used: succeeded.iter().map(|r| r.tool.clone()).collect(),
            total_tokens: succeeded.iter().map(|r| r.tokens_used).sum(),
            average_relevance,
            successes: succeeded.len(),
            failures: results.len() - succeeded.len(),
            total_time_ms: results.iter().map(|r| r.execution_time_ms).sum(),
        }
    }
}

/// `ceil(len / 4)` over the JSON encoding
pub fn estimate_tokens(data: &Value) -> u64 {
    let len = serde_json::to_string(data).map(|s| s.len()).unwrap_or(0) as u64;
    len.div_ceil(4)
}

impl Dependent for Arc<dyn Tool> {
    fn key(&self) -> &str {
        self.name()
    }

    fn requires(&self) -> &[String] {
        &self.spec().dependencies
    }
}

/// Tools of one or more plan steps, run together
struct Batch {
    tools: Vec<Arc<dyn Tool>>,
    parallel: bool,
}

pub struct ExecutionCoordinator {
    registry: Arc<BundleRegistry>,
    default_relevance: f64,
    metrics: Option<Arc<Metrics>>,
}

impl ExecutionCoordinator {
    pub fn new(registry: Arc<BundleRegistry>, default_relevance: f64) -> Self {
        Self {
            registry,
            default_relevance,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run a plan in order.
    ///
    /// Bundle steps expand to their tools. Consecutive parallel steps run
    /// concurrently as one batch; sequential steps run their tools one at a
    /// time. A tool appearing in several steps runs once. Results follow
    /// plan order and never short-circuit on failure.
    pub async fn execute(&self, steps: &[ExecutionStep], context: &SelectionContext) -> Vec<ToolResult> {
        let params = ToolParams::new(&context.project_path, &context.task);
        let batches = self.batches(steps);

        let mut results = Vec::new();
        for batch in batches {
            if batch.parallel {
                let runs = batch.tools.iter().map(|tool| self.run_tool(tool.as_ref(), &params));
                results.extend(join_all(runs).await);
            } else {
                for tool in &batch.tools {
                    results.push(self.run_tool(tool.as_ref(), &params).await);
                }
            }
        }

        let failures = results.iter().filter(|r| !r.success).count();
        info!(
            "Executed {} tools across {} steps ({} failed)",
            results.len(),
            steps.len(),
            failures
        );
        results
    }

    fn batches(&self, steps: &[ExecutionStep]) -> Vec<Batch> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut batches: Vec<Batch> = Vec::new();

        for step in steps {
            let tools: Vec<Arc<dyn Tool>> = self
                .step_tools(step)
                .into_iter()
                .filter(|t| seen.insert(t.name().to_string()))
                .collect();
            if tools.is_empty() {
                continue;
            }

            match batches.last_mut() {
                Some(last) if last.parallel && step.can_run_in_parallel => last.tools.extend(tools),
                _ => batches.push(Batch {
                    tools,
                    parallel: step.can_run_in_parallel,
                }),
            }
        }
        batches
    }

    /// Tools a step runs. Dependency-based bundles put each tool after the
    /// tools it depends on within the bundle; other bundles keep declared
    /// order.
    fn step_tools(&self, step: &ExecutionStep) -> Vec<Arc<dyn Tool>> {
        let (names, order) = match step.kind {
            StepKind::Tool => (vec![step.id.clone()], ExecutionOrder::Sequential),
            StepKind::Bundle => match self.registry.get_bundle(&step.id) {
                Some(bundle) => (bundle.tools, bundle.execution_order),
                None => {
                    debug!("Skipping unknown bundle {}", step.id);
                    return Vec::new();
                }
            },
        };

        let tools: Vec<Arc<dyn Tool>> = names
            .iter()
            .filter_map(|name| {
                let tool = self.registry.tool(name);
                if tool.is_none() {
                    debug!("Skipping unknown tool {}", name);
                }
                tool
            })
            .collect();

        if order == ExecutionOrder::DependencyBased {
            dependency_order(tools)
        } else {
            tools
        }
    }

    async fn run_tool(&self, tool: &dyn Tool, params: &ToolParams) -> ToolResult {
        let started = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(params)).catch_unwind().await;
        let elapsed = started.elapsed();

        let failed = |message: String| ToolResult {
            tool: tool.name().to_string(),
            success: false,
            data: Value::Null,
            tokens_used: 0,
            execution_time_ms: elapsed.as_millis() as u64,
            relevance_score: 0.0,
            error: Some(message),
        };

        let result = match outcome {
            Ok(Ok(output)) => {
                let tokens_used = output.tokens_used.unwrap_or_else(|| estimate_tokens(&output.data));
                ToolResult {
                    tool: tool.name().to_string(),
                    success: true,
                    data: output.data,
                    tokens_used,
                    execution_time_ms: elapsed.as_millis() as u64,
                    relevance_score: output.relevance.unwrap_or(self.default_relevance),
                    error: None,
                }
            }
            Ok(Err(e)) => {
                warn!("Tool {} failed: {}", tool.name(), e);
                failed(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref()).unwrap_or_else(|| "tool panicked".to_string());
                warn!("Tool {} panicked: {}", tool.name(), message);
                failed(format!("panicked: {message}"))
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_tool(&result.tool, result.success, elapsed.as_secs_f64());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundles::{Bundle, ExecutionOrder, InMemoryBundleStore};
    use crate::tools::quality::{TEST_RUNNER, TYPE_CHECK};
    use crate::tools::{ToolError, ToolOutput, ToolRegistry, ToolSpec};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Outcome {
        Ok,
        Fail,
        Panic,
    }

    /// Records start order and sleeps before answering
    struct Probe {
        spec: ToolSpec,
        delay_ms: u64,
        outcome: Outcome,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for Probe {
        fn spec(&self) -> &ToolSpec {
            &self.spec
        }

        async fn execute(&self, _params: &ToolParams) -> Result<ToolOutput, ToolError> {
            self.log.lock().unwrap().push(self.spec.name.clone());
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            match self.outcome {
                Outcome::Ok => Ok(ToolOutput::new(json!({ "tool": self.spec.name }))),
                Outcome::Fail => Err(ToolError::Exec("exploded".to_string())),
                Outcome::Panic => panic!("tool blew up"),
            }
        }
    }

    fn setup_specs(
        tools: Vec<(ToolSpec, u64, Outcome)>,
        bundles: Vec<Bundle>,
    ) -> (ExecutionCoordinator, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        for (spec, delay_ms, outcome) in tools {
            registry.register(Arc::new(Probe {
                spec,
                delay_ms,
                outcome,
                log: log.clone(),
            }));
        }
        let bundles_registry = BundleRegistry::new(registry, Arc::new(InMemoryBundleStore::new()));
        for bundle in bundles {
            bundles_registry.register(bundle);
        }
        (ExecutionCoordinator::new(Arc::new(bundles_registry), 0.8), log)
    }

    fn setup(tools: &[(&str, u64, bool)], bundles: Vec<Bundle>) -> (ExecutionCoordinator, Arc<Mutex<Vec<String>>>) {
        let tools = tools
            .iter()
            .map(|(name, delay_ms, fail)| {
                let outcome = if *fail { Outcome::Fail } else { Outcome::Ok };
                (ToolSpec::new(*name, ""), *delay_ms, outcome)
            })
            .collect();
        setup_specs(tools, bundles)
    }

    fn step(kind: StepKind, id: &str, parallel: bool) -> ExecutionStep {
        ExecutionStep {
            kind,
            id: id.to_string(),
            name: id.to_string(),
            depends_on: vec![],
            can_run_in_parallel: parallel,
            order: 0,
        }
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let (coordinator, _) = setup(&[("ok", 0, false), ("bad", 0, true)], vec![]);
        let steps = vec![step(StepKind::Tool, "bad", true), step(StepKind::Tool, "ok", true)];

        let results = coordinator.execute(&steps, &SelectionContext::new("q", "/p")).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool, "bad");
        assert!(!results[0].success);
        assert_eq!(results[0].data, Value::Null);
        assert_eq!(results[0].tokens_used, 0);
        assert!(results[1].success);
        assert_eq!(results[1].relevance_score, 0.8);
        // {"tool":"ok"} is 13 bytes
        assert_eq!(results[1].tokens_used, 4);
    }

    #[tokio::test]
    async fn test_parallel_results_keep_input_order() {
        let (coordinator, _) = setup(&[("slow", 50, false), ("fast", 0, false)], vec![]);
        let steps = vec![step(StepKind::Tool, "slow", true), step(StepKind::Tool, "fast", true)];

        let results = coordinator.execute(&steps, &SelectionContext::new("q", "/p")).await;
        let names: Vec<&str> = results.iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_sequential_bundle_runs_in_declared_order() {
        let bundle = Bundle::new("chain", "Chain")
            .with_tools(["first", "ghost", "second", "third"])
            .with_execution_order(ExecutionOrder::Sequential);
        let (coordinator, log) = setup(
            &[("first", 20, false), ("second", 0, false), ("third", 0, false)],
            vec![bundle],
        );

        let steps = vec![step(StepKind::Bundle, "chain", false), step(StepKind::Tool, "second", true)];
        let results = coordinator.execute(&steps, &SelectionContext::new("q", "/p")).await;

        assert_eq!(results.len(), 3);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_panicking_tool_is_isolated() {
        let (coordinator, _) = setup_specs(
            vec![
                (ToolSpec::new("crashy", ""), 0, Outcome::Panic),
                (ToolSpec::new("steady", ""), 10, Outcome::Ok),
            ],
            vec![],
        );
        let steps = vec![step(StepKind::Tool, "crashy", true), step(StepKind::Tool, "steady", true)];

        let results = coordinator.execute(&steps, &SelectionContext::new("q", "/p")).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool, "crashy");
        assert!(!results[0].success);
        assert_eq!(results[0].data, Value::Null);
        assert_eq!(results[0].tokens_used, 0);
        assert!(results[0].error.as_deref().unwrap().contains("tool blew up"));
        assert!(results[1].success);

        let compiled = CompiledResult::compile(&results);
        assert_eq!(compiled.tools_used, vec!["steady"]);
        assert_eq!(compiled.failures, 1);
    }

    #[tokio::test]
    async fn test_dependency_based_bundle_runs_dependencies_first() {
        let bundle = Bundle::new("ci", "CI")
            .with_tools([TEST_RUNNER, TYPE_CHECK])
            .with_execution_order(ExecutionOrder::DependencyBased);
        let (coordinator, log) = setup_specs(
            vec![
                (ToolSpec::new(TEST_RUNNER, "").with_dependencies([TYPE_CHECK]), 0, Outcome::Ok),
                (ToolSpec::new(TYPE_CHECK, ""), 0, Outcome::Ok),
            ],
            vec![bundle],
        );

        let steps = vec![step(StepKind::Bundle, "ci", false)];
        let results = coordinator.execute(&steps, &SelectionContext::new("q", "/p")).await;

        assert_eq!(*log.lock().unwrap(), vec![TYPE_CHECK, TEST_RUNNER]);
        let names: Vec<&str> = results.iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(names, vec![TYPE_CHECK, TEST_RUNNER]);
    }

    #[test]
    fn test_compile_counts_successes_only() {
        let ok = |tool: &str, tokens, relevance| ToolResult {
            tool: tool.to_string(),
            success: true,
            data: Value::Null,
            tokens_used: tokens,
            execution_time_ms: 5,
            relevance_score: relevance,
            error: None,
        };
        let mut failed = ok("broken", 0, 0.0);
        failed.success = false;

        let compiled = CompiledResult::compile(&[ok("a", 10, 0.8), failed, ok("b", 30, 0.6)]);
        assert_eq!(compiled.tools_used, vec!["a", "b"]);
        assert_eq!(compiled.total_tokens, 40);
        assert!((compiled.average_relevance - 0.7).abs() < 1e-9);
        assert_eq!(compiled.failures, 1);
        assert_eq!(compiled.total_time_ms, 15);

        assert_eq!(CompiledResult::compile(&[]).average_relevance, 0.0);
    }
}
