//! Bundle selection: condition/trigger/scenario scoring and tool ranking

use super::conditions::ConditionEvaluator;
use super::models::{SelectionContext, SelectionResult};
use super::planner::ExecutionPlanner;
use crate::bundles::{Bundle, BundleRegistry};
use crate::config::{SelectionConfig, MAX_BUNDLES_PER_SELECTION};
use crate::error::Result;
use crate::tools::ToolSpec;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Bundle with its score for a context
#[derive(Debug, Clone)]
pub struct ScoredBundle {
    pub bundle: Bundle,
    pub score: f64,
    /// Auto-trigger phrases found in the task
    pub triggers: Vec<String>,
}

/// Tool with its assessed relevance
#[derive(Debug, Clone)]
pub struct RankedTool {
    pub spec: ToolSpec,
    pub relevance: f64,
}

pub struct BundleSelector {
    registry: Arc<BundleRegistry>,
    evaluator: ConditionEvaluator,
    max_bundles: usize,
    max_individual_tools: usize,
}

impl BundleSelector {
    pub fn new(registry: Arc<BundleRegistry>, config: &SelectionConfig) -> Self {
        Self {
            registry,
            evaluator: ConditionEvaluator::new(),
            max_bundles: config.max_bundles.min(MAX_BUNDLES_PER_SELECTION),
            max_individual_tools: config.max_individual_tools,
        }
    }

    pub fn registry(&self) -> &Arc<BundleRegistry> {
        &self.registry
    }

    pub fn max_bundles(&self) -> usize {
        self.max_bundles
    }

    /// `priority + Σ condition × weight + 2 per trigger + 1 per scenario`
    pub fn score_bundle(&self, bundle: &Bundle, context: &SelectionContext) -> ScoredBundle {
        let task = context.task.to_lowercase();

        let triggers: Vec<String> = bundle
            .auto_trigger
            .iter()
            .filter(|t| !t.is_empty() && task.contains(&t.to_lowercase()))
            .cloned()
            .collect();

        let scenarios = bundle
            .scenarios
            .iter()
            .filter(|s| !s.is_empty() && task.contains(&s.to_lowercase()))
            .count();

        let score = bundle.priority
            + self.evaluator.weighted_score(&bundle.conditions, context)
            + 2.0 * triggers.len() as f64
            + scenarios as f64;

        ScoredBundle {
            bundle: bundle.clone(),
            score,
            triggers,
        }
    }

    /// Every active bundle, best first; ties keep registry order
    pub fn evaluate_bundles(&self, context: &SelectionContext) -> Vec<ScoredBundle> {
        let mut scored: Vec<ScoredBundle> = self
            .registry
            .active_bundles()
            .iter()
            .map(|b| self.score_bundle(b, context))
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        for s in &scored {
            debug!("Bundle {} scored {:.2}", s.bundle.id, s.score);
        }
        scored
    }

    /// Positive-scoring bundles, capped
    pub fn top_bundles(&self, context: &SelectionContext) -> Vec<ScoredBundle> {
        self.evaluate_bundles(context)
            .into_iter()
            .filter(|s| s.score > 0.0)
            .take(self.max_bundles)
            .collect()
    }

    /// Registry tools not in `exclude` with positive relevance, best first
    pub fn rank_tools(
        &self,
        context: &SelectionContext,
        exclude: &HashSet<String>,
    ) -> Result<Vec<RankedTool>> {
        let mut ranked = Vec::new();
        for tool in self.registry.tools().iter() {
            if exclude.contains(tool.name()) {
                continue;
            }
            let relevance = tool.assess(context)?;
            if relevance > 0.0 {
                ranked.push(RankedTool {
                    spec: tool.spec().clone(),
                    relevance,
                });
            }
        }

        ranked.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        ranked.truncate(self.max_individual_tools);
        Ok(ranked)
    }

    /// Union of the bundles' tools resolved against the registry, first
    /// occurrence wins; unknown names are dropped
    pub fn bundle_tools(&self, bundles: &[Bundle]) -> Vec<ToolSpec> {
        let mut seen = HashSet::new();
        let mut tools = Vec::new();
        for name in bundles.iter().flat_map(|b| b.tools.iter()) {
            if !seen.insert(name.as_str()) {
                continue;
            }
            match self.registry.tool(name) {
                Some(tool) => tools.push(tool.spec().clone()),
                None => debug!("Skipping unknown tool {}", name),
            }
        }
        tools
    }

    /// Top bundles, their tools, then individually ranked extras
    pub fn select_bundles_and_tools(&self, context: &SelectionContext) -> Result<SelectionResult> {
        let scored = self.top_bundles(context);
        let triggered: Vec<(String, Vec<String>)> = scored
            .iter()
            .filter(|s| !s.triggers.is_empty())
            .map(|s| (s.bundle.name.clone(), s.triggers.clone()))
            .collect();
        let bundles: Vec<Bundle> = scored.into_iter().map(|s| s.bundle).collect();

        let covered: HashSet<String> = bundles.iter().flat_map(|b| b.tools.iter().cloned()).collect();
        let extras = self.rank_tools(context, &covered)?;

        Ok(self.build_selection(
            bundles,
            extras.into_iter().map(|t| t.spec).collect(),
            &triggered,
            context,
        ))
    }

    /// Assemble a result: tool union, plan, cost, time and reasoning
    pub fn build_selection(
        &self,
        bundles: Vec<Bundle>,
        individual: Vec<ToolSpec>,
        triggered: &[(String, Vec<String>)],
        context: &SelectionContext,
    ) -> SelectionResult {
        let mut tools = self.bundle_tools(&bundles);
        for spec in individual {
            if !tools.iter().any(|t| t.name == spec.name) {
                tools.push(spec);
            }
        }

        let execution_plan = self.create_execution_plan(&bundles, &tools);
        let total_token_cost = self.calculate_token_cost(&bundles, &tools);
        let estimated_time = self.estimate_execution_time(&execution_plan);
        let reasoning = reasoning(&bundles, &tools, triggered, context);

        SelectionResult {
            selected_bundles: bundles,
            selected_tools: tools,
            execution_plan,
            reasoning,
            total_token_cost,
            estimated_time,
        }
    }
}

impl ExecutionPlanner for BundleSelector {}

fn reasoning(
    bundles: &[Bundle],
    tools: &[ToolSpec],
    triggered: &[(String, Vec<String>)],
    context: &SelectionContext,
) -> String {
    let mut parts = Vec::new();

    if bundles.is_empty() {
        parts.push("No bundles selected".to_string());
    } else {
        let names: Vec<&str> = bundles.iter().map(|b| b.name.as_str()).collect();
        parts.push(format!("Selected bundles: {}", names.join(", ")));
    }
    for (bundle, triggers) in triggered {
        parts.push(format!("{bundle} matched auto-trigger: {}", triggers.join(", ")));
    }

    if !tools.is_empty() {
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        parts.push(format!("Tools: {}", names.join(", ")));
    }

    parts.push(format!("Task: \"{}\"", context.task));

    if let Some(cb) = &context.codebase_context {
        let complexity = if cb.complexity.is_empty() { "unknown" } else { cb.complexity.as_str() };
        let languages = if cb.primary_languages.is_empty() {
            "unspecified".to_string()
        } else {
            cb.primary_languages.join(", ")
        };
        parts.push(format!("Codebase: {complexity} complexity, languages: {languages}"));
    }

    parts.join(". ")
}
