//! Context optimizer: scan, score, cut, extract
//!
//! Produces the ranked file list handed to the LLM, bounded by a token
//! budget. Results are memoized per request until `clear_cache` is called.

use super::file_scorer::{language_for, FileScorer};
use super::models::{FileCandidate, OptimizationRequest, OptimizationStrategy, OptimizedContext};
use super::scanner::{scoring_path, ProjectScanner};
use super::sections::{summarize, SectionExtractor};
use super::token_budget::TokenBudgetManager;
use super::token_estimator::{CharRatioEstimator, TokenEstimator};
use crate::config::ContextConfig;
use crate::error::{ContextError, Result};
use crate::metrics::Metrics;
use moka::future::Cache;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    project_path: PathBuf,
    query: String,
    strategy: OptimizationStrategy,
    focus_area: Option<String>,
    token_budget: usize,
}

impl From<&OptimizationRequest> for CacheKey {
    fn from(request: &OptimizationRequest) -> Self {
        Self {
            project_path: request.project_path.clone(),
            query: request.query.clone(),
            strategy: request.strategy,
            focus_area: request.focus_area.clone(),
            token_budget: request.token_budget,
        }
    }
}

/// Context optimizer
pub struct ContextOptimizer {
    scorer: FileScorer,
    extractor: SectionExtractor,
    budget: TokenBudgetManager,
    estimator: Arc<dyn TokenEstimator>,
    minimal_files: usize,
    full_files: usize,
    cache: Cache<CacheKey, Arc<OptimizedContext>>,
    metrics: Option<Arc<Metrics>>,
}

impl ContextOptimizer {
    pub fn new(config: &ContextConfig) -> Result<Self> {
        let budget = TokenBudgetManager::new(config.budget.clone())
            .map_err(|e| ContextError::Configuration(e.to_string()))?;

        Ok(Self {
            scorer: FileScorer::new(),
            extractor: SectionExtractor::new(config.max_sections_per_file),
            budget,
            estimator: Arc::new(CharRatioEstimator::default()),
            minimal_files: config.minimal_files,
            full_files: config.full_files,
            cache: Cache::new(config.cache_capacity),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Optimize context for a request.
    ///
    /// Never fails: unreadable projects and files shrink the result instead.
    pub async fn optimize(&self, request: &OptimizationRequest) -> Arc<OptimizedContext> {
        let key = CacheKey::from(request);
        if let Some(cached) = self.cache.get(&key).await {
            debug!("Context cache hit for '{}'", request.query);
            return cached;
        }

        let result = Arc::new(self.compute(request).await);
        self.cache.insert(key, result.clone()).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_context(result.estimated_tokens, result.files.len());
        }

        info!(
            "Optimized context: {} of {} files, ~{} tokens ({} strategy)",
            result.files.len(),
            result.files_scanned,
            result.estimated_tokens,
            result.strategy
        );

        result
    }

    /// Drop every memoized result
    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }

    /// Score and rank every supported file in the project, best first
    pub async fn rank_files(&self, request: &OptimizationRequest) -> Vec<FileCandidate> {
        let scanner = ProjectScanner::new(&request.project_path);
        let root_scanner = scanner.clone();
        let files = tokio::task::spawn_blocking(move || root_scanner.scan())
            .await
            .unwrap_or_default();

        let query = Some(request.query.as_str()).filter(|q| !q.trim().is_empty());
        let focus = request.focus_area.as_deref();

        let mut ranked: Vec<FileCandidate> = files
            .iter()
            .map(|path| {
                let relative = scanner.relative(path);
                let score = self.scorer.score(&scoring_path(&relative), query, focus);
                let language = language_for(&relative);
                FileCandidate::new(relative, score, language)
            })
            .collect();

        // stable: equal scores keep scan order
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    async fn compute(&self, request: &OptimizationRequest) -> OptimizedContext {
        let ranked = self.rank_files(request).await;
        let files_scanned = ranked.len();

        let selected = match request.strategy {
            OptimizationStrategy::Minimal => ranked.into_iter().take(self.minimal_files).collect(),
            OptimizationStrategy::Full => ranked.into_iter().take(self.full_files).collect(),
            OptimizationStrategy::Smart => {
                self.budget.allocate(ranked, request.token_budget).selected
            }
        };

        let mut files = Vec::with_capacity(selected.len());
        let mut estimated_tokens = 0;

        for mut candidate in selected {
            let absolute = request.project_path.join(&candidate.path);
            let content = match tokio::fs::read_to_string(&absolute).await {
                Ok(content) => content,
                Err(e) => {
                    debug!("Skipping unreadable file {}: {}", absolute.display(), e);
                    continue;
                }
            };

            candidate.relevant_sections =
                self.extractor
                    .extract(&content, &request.query, request.focus_area.as_deref());
            candidate.summary = Some(summarize(&content));

            estimated_tokens += if candidate.relevant_sections.is_empty() {
                self.budget
                    .estimate_for(candidate.importance, request.token_budget)
            } else {
                candidate
                    .relevant_sections
                    .iter()
                    .map(|s| self.estimator.estimate(&s.content))
                    .sum()
            };

            files.push(candidate);
        }

        OptimizedContext {
            project_path: request.project_path.clone(),
            query: request.query.clone(),
            focus_area: request.focus_area.clone(),
            strategy: request.strategy,
            token_budget: request.token_budget,
            files,
            estimated_tokens,
            files_scanned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "src/api/auth.ts",
            "import jwt from 'jsonwebtoken';\n\nexport function login(user) {\n  return jwt.sign(user);\n}\n",
        );
        write(dir.path(), "src/utils/format.ts", "export const pad = (s) => s;\n");
        write(dir.path(), "README.md", "# Demo\n");
        write(dir.path(), "docs/notes.txt", "plain notes\n");
        dir
    }

    fn optimizer() -> ContextOptimizer {
        ContextOptimizer::new(&ContextConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_ranking_orders_by_score() {
        let dir = project();
        let request = OptimizationRequest::new(dir.path(), "auth login", 8000);
        let ranked = optimizer().rank_files(&request).await;

        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked[0].path, PathBuf::from("src/api/auth.ts"));
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_minimal_strategy_and_sections() {
        let dir = project();
        let request = OptimizationRequest::new(dir.path(), "login", 8000)
            .with_strategy(OptimizationStrategy::Minimal);
        let context = optimizer().optimize(&request).await;

        assert_eq!(context.files_scanned, 4);
        assert_eq!(context.files.len(), 4);

        let auth = &context.files[0];
        assert_eq!(auth.summary.as_deref(), Some("export function login(user) {"));
        assert!(!auth.relevant_sections.is_empty());
        assert!(context.estimated_tokens > 0);
    }

    #[tokio::test]
    async fn test_results_are_cached_until_cleared() {
        let dir = project();
        let optimizer = optimizer();
        let request = OptimizationRequest::new(dir.path(), "format", 8000);

        let first = optimizer.optimize(&request).await;
        write(dir.path(), "src/format/extra.ts", "export const x = 1;\n");
        let second = optimizer.optimize(&request).await;
        assert!(Arc::ptr_eq(&first, &second));

        optimizer.clear_cache();
        let third = optimizer.optimize(&request).await;
        assert_eq!(third.files_scanned, 5);
    }

    #[tokio::test]
    async fn test_missing_project_is_empty() {
        let request = OptimizationRequest::new("/no/such/project/dir", "anything", 8000);
        let context = optimizer().optimize(&request).await;
        assert!(context.files.is_empty());
        assert_eq!(context.estimated_tokens, 0);
    }
}
