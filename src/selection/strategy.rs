//! Strategy selection: classify the task, run the matching selection path,
//! refine confidence and cache the outcome
//!
//! Selection never fails outward. Errors and panics inside a strategy are
//! turned into a fixed direct-answer fallback.

use super::cache::{cache_key, SelectionCache};
use super::models::{EnhancedSelectionResult, SelectionContext, SelectionResult, SelectionStrategy};
use super::selector::BundleSelector;
use crate::bundles::Bundle;
use crate::config::SelectionConfig;
use crate::error::{panic_message, Result};
use crate::metrics::Metrics;
use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DIRECT_CONFIDENCE: f64 = 0.95;
const FALLBACK_CONFIDENCE: f64 = 0.3;
const BASE_CONFIDENCE: f64 = 0.5;
const SELECTION_BONUS: f64 = 0.2;
const AUTO_TRIGGER_BONUS: f64 = 0.15;
const COMPLEX_CODEBASE_SIZE: u64 = 10_000;
const MAX_OVERLAP: f64 = 0.5;

fn phrase_pattern(phrases: &[&str]) -> Regex {
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("invalid regex")
}

static GENERAL_KNOWLEDGE: Lazy<Regex> = Lazy::new(|| {
    phrase_pattern(&[
        "what is",
        "what are",
        "how to",
        "how do",
        "explain",
        "define",
        "definition of",
        "latest news",
        "tutorial",
        "best practices for",
        "difference between",
        "who is",
        "when was",
        "history of",
    ])
});

static COMPLEX_TASK: Lazy<Regex> = Lazy::new(|| {
    phrase_pattern(&[
        "refactor",
        "comprehensive",
        "full audit",
        "migration",
        "migrate",
        "architecture review",
        "entire codebase",
        "whole project",
        "security audit",
        "performance audit",
        "restructure",
        "overhaul",
    ])
});

static FOCUSED_TASK: Lazy<Regex> = Lazy::new(|| {
    phrase_pattern(&[
        "add function",
        "fix bug",
        "single file",
        "one method",
        "rename variable",
        "add method",
        "fix typo",
        "update import",
        "small change",
        "quick fix",
    ])
});

/// Classify a task; first match wins
pub fn determine_selection_strategy(context: &SelectionContext) -> SelectionStrategy {
    let task = context.task.as_str();

    if GENERAL_KNOWLEDGE.is_match(task) {
        return SelectionStrategy::ClaudeDirect;
    }

    let complex_codebase = context.codebase_context.as_ref().is_some_and(|cb| {
        cb.size > COMPLEX_CODEBASE_SIZE || cb.complexity.eq_ignore_ascii_case("high")
    });
    if COMPLEX_TASK.is_match(task) || complex_codebase {
        return SelectionStrategy::BundleFirst;
    }

    if FOCUSED_TASK.is_match(task) {
        return SelectionStrategy::ToolFirst;
    }

    SelectionStrategy::Hybrid
}

/// Strategy bonus and post-refinement ceiling
fn strategy_bounds(strategy: SelectionStrategy) -> (f64, f64) {
    match strategy {
        SelectionStrategy::BundleFirst => (0.10, 0.85),
        SelectionStrategy::ToolFirst => (0.05, 0.75),
        SelectionStrategy::Hybrid => (0.10, 0.90),
        SelectionStrategy::ClaudeDirect => (0.0, DIRECT_CONFIDENCE),
    }
}

/// `min(0.5 + 0.2·selected + 0.15·auto-trigger + bonus, ceiling, 1.0)`
pub fn refine_confidence(strategy: SelectionStrategy, selection: &SelectionResult) -> f64 {
    let mut confidence = BASE_CONFIDENCE;
    if !selection.is_empty() {
        confidence += SELECTION_BONUS;
    }
    if selection.reasoning.contains("auto-trigger") {
        confidence += AUTO_TRIGGER_BONUS;
    }
    let (bonus, ceiling) = strategy_bounds(strategy);
    (confidence + bonus).min(ceiling).min(1.0)
}

/// Tool-name overlap: |A ∩ B| / max(|A|, |B|)
pub fn tool_overlap(bundle_tools: &[String], selected: &HashSet<String>) -> f64 {
    let denominator = bundle_tools.len().max(selected.len());
    if denominator == 0 {
        return 0.0;
    }
    let shared = bundle_tools.iter().filter(|t| selected.contains(*t)).count();
    shared as f64 / denominator as f64
}

pub struct StrategySelector {
    selector: Arc<BundleSelector>,
    cache: SelectionCache,
    max_complementary: usize,
    metrics: Option<Arc<Metrics>>,
}

impl StrategySelector {
    pub fn new(selector: Arc<BundleSelector>, config: &SelectionConfig) -> Self {
        let cache = SelectionCache::new(
            config.cache_ttl(),
            config.cache_max_entries,
            config.cache_evict_count,
        );
        Self::with_cache(selector, cache, config)
    }

    pub fn with_cache(selector: Arc<BundleSelector>, cache: SelectionCache, config: &SelectionConfig) -> Self {
        Self {
            selector,
            cache,
            max_complementary: config.max_complementary_bundles,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn bundle_selector(&self) -> &Arc<BundleSelector> {
        &self.selector
    }

    pub fn cache(&self) -> &SelectionCache {
        &self.cache
    }

    /// Cached or freshly computed selection; never fails
    pub async fn select_optimal_approach(&self, context: &SelectionContext) -> Arc<EnhancedSelectionResult> {
        let key = cache_key(context);
        if let Some(cached) = self.cache.get(&key) {
            debug!("Selection cache hit");
            self.record_cache(true);
            return cached;
        }
        self.record_cache(false);

        let outcome = AssertUnwindSafe(self.run(context)).catch_unwind().await;
        let result = match outcome {
            Ok(Ok(result)) => Arc::new(result),
            Ok(Err(e)) => return self.fallback(&e.to_string()),
            Err(panic) => {
                let message = panic_message(panic.as_ref()).unwrap_or_else(|| "panic during selection".to_string());
                return self.fallback(&message);
            }
        };

        info!(
            "Selected {} strategy: {} bundles, {} tools, confidence {:.2}",
            result.selection_strategy,
            result.selection.selected_bundles.len(),
            result.selection.selected_tools.len(),
            result.confidence
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_selection(result.selection_strategy.as_str());
        }

        self.cache.insert(key, result.clone());
        result
    }

    async fn run(&self, context: &SelectionContext) -> Result<EnhancedSelectionResult> {
        let strategy = determine_selection_strategy(context);
        debug!("Task classified as {}", strategy);

        if strategy == SelectionStrategy::ClaudeDirect {
            return Ok(EnhancedSelectionResult {
                selection: SelectionResult::empty(format!(
                    "General knowledge question; answering directly. Task: \"{}\"",
                    context.task
                )),
                selection_strategy: strategy,
                confidence: DIRECT_CONFIDENCE,
                recommendations: vec![
                    "Answered directly by the model; no project tools are needed".to_string(),
                ],
            });
        }

        let selection = match strategy {
            SelectionStrategy::BundleFirst => self.selector.select_bundles_and_tools(context)?,
            SelectionStrategy::ToolFirst => self.tool_first(context)?,
            _ => self.hybrid(context)?,
        };

        let confidence = refine_confidence(strategy, &selection);
        let recommendations = recommendations(strategy, &selection);

        Ok(EnhancedSelectionResult {
            selection,
            selection_strategy: strategy,
            confidence,
            recommendations,
        })
    }

    /// Individual tools first, then up to N bundles that mostly add new tools
    fn tool_first(&self, context: &SelectionContext) -> Result<SelectionResult> {
        let tools = self.selector.rank_tools(context, &HashSet::new())?;
        let chosen: HashSet<String> = tools.iter().map(|t| t.spec.name.clone()).collect();

        let mut bundles: Vec<Bundle> = Vec::new();
        let mut triggered = Vec::new();
        for scored in self.selector.top_bundles(context) {
            if bundles.len() >= self.max_complementary {
                break;
            }
            let overlap = tool_overlap(&scored.bundle.tools, &chosen);
            if overlap < MAX_OVERLAP {
                debug!("Complementary bundle {} (overlap {:.2})", scored.bundle.id, overlap);
                if !scored.triggers.is_empty() {
                    triggered.push((scored.bundle.name.clone(), scored.triggers.clone()));
                }
                bundles.push(scored.bundle);
            }
        }

        Ok(self.selector.build_selection(
            bundles,
            tools.into_iter().map(|t| t.spec).collect(),
            &triggered,
            context,
        ))
    }

    /// Bundle selection and individual ranking merged, without tools the
    /// chosen bundles already cover
    fn hybrid(&self, context: &SelectionContext) -> Result<SelectionResult> {
        let scored = self.selector.top_bundles(context);
        let tools = self.selector.rank_tools(context, &HashSet::new())?;

        let covered: HashSet<&str> = scored
            .iter()
            .flat_map(|s| s.bundle.tools.iter().map(String::as_str))
            .collect();
        let remainder: Vec<_> = tools
            .into_iter()
            .filter(|t| !covered.contains(t.spec.name.as_str()))
            .map(|t| t.spec)
            .collect();

        let triggered: Vec<(String, Vec<String>)> = scored
            .iter()
            .filter(|s| !s.triggers.is_empty())
            .map(|s| (s.bundle.name.clone(), s.triggers.clone()))
            .collect();
        let bundles = scored.into_iter().map(|s| s.bundle).collect();

        Ok(self.selector.build_selection(bundles, remainder, &triggered, context))
    }

    fn fallback(&self, error: &str) -> Arc<EnhancedSelectionResult> {
        warn!("Selection failed, falling back to direct answer: {}", error);
        if let Some(metrics) = &self.metrics {
            metrics.selection_fallbacks.inc();
        }

        Arc::new(EnhancedSelectionResult {
            selection: SelectionResult::empty("Selection failed; answering directly"),
            selection_strategy: SelectionStrategy::ClaudeDirect,
            confidence: FALLBACK_CONFIDENCE,
            recommendations: vec![format!(
                "Tool selection failed ({error}); the question will be answered without project tools"
            )],
        })
    }

    fn record_cache(&self, hit: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(hit);
        }
    }
}

fn recommendations(strategy: SelectionStrategy, selection: &SelectionResult) -> Vec<String> {
    let mut recommendations = Vec::new();

    if selection.is_empty() {
        recommendations.push(
            "No bundles or tools matched this task; consider creating a bundle for it".to_string(),
        );
        return recommendations;
    }

    match strategy {
        SelectionStrategy::BundleFirst => recommendations.push(format!(
            "Complex task: running {} bundle(s) for broad coverage",
            selection.selected_bundles.len()
        )),
        SelectionStrategy::ToolFirst => recommendations.push(format!(
            "Focused task: running {} targeted tool(s)",
            selection.selected_tools.len()
        )),
        _ => recommendations.push(format!(
            "Combining {} bundle(s) with {} tool(s)",
            selection.selected_bundles.len(),
            selection.selected_tools.len()
        )),
    }

    let sequential = selection
        .execution_plan
        .iter()
        .filter(|s| !s.can_run_in_parallel)
        .count();
    if sequential > 0 {
        recommendations.push(format!(
            "{sequential} step(s) run sequentially; expect about {}s",
            selection.estimated_time
        ));
    }

    recommendations
}
