//! Context optimizer exposed as a tool

use super::{ExecutionSpeed, TokenCost, Tool, ToolError, ToolOutput, ToolParams, ToolSpec};
use crate::context::{ContextOptimizer, OptimizationRequest, OptimizationStrategy};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const CONTEXT_OPTIMIZER: &str = "context_optimizer";

/// Runs a `smart` optimization and reports the chosen files
pub struct ContextOptimizerTool {
    spec: ToolSpec,
    optimizer: Arc<ContextOptimizer>,
    token_budget: usize,
}

impl ContextOptimizerTool {
    pub fn new(optimizer: Arc<ContextOptimizer>, token_budget: usize) -> Self {
        let spec = ToolSpec::new(
            CONTEXT_OPTIMIZER,
            "Rank project files against the task and extract the most relevant sections",
        )
        .with_capabilities(["context", "relevant files", "file ranking", "code understanding"])
        .with_token_cost(TokenCost::Medium)
        .with_execution_time(ExecutionSpeed::Fast)
        .with_reliability(0.95);

        Self {
            spec,
            optimizer,
            token_budget,
        }
    }
}

#[async_trait]
impl Tool for ContextOptimizerTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolOutput, ToolError> {
        let request = OptimizationRequest::new(&params.project_path, &params.query, self.token_budget)
            .with_strategy(OptimizationStrategy::Smart);
        let context = self.optimizer.optimize(&request).await;

        let files: Vec<_> = context
            .files
            .iter()
            .map(|f| {
                json!({
                    "path": f.path,
                    "score": f.score,
                    "importance": f.importance,
                    "summary": f.summary,
                    "sections": f.relevant_sections.len(),
                })
            })
            .collect();

        let data = json!({
            "files": files,
            "filesScanned": context.files_scanned,
            "estimatedTokens": context.estimated_tokens,
        });

        Ok(ToolOutput::new(data).with_tokens(context.estimated_tokens as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reports_selected_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/index.ts"), "export const main = () => 1;\n").unwrap();

        let optimizer = Arc::new(ContextOptimizer::new(&ContextConfig::default()).unwrap());
        let tool = ContextOptimizerTool::new(optimizer, 8000);
        let output = tool
            .execute(&ToolParams::new(dir.path(), "main entry"))
            .await
            .unwrap();

        assert_eq!(output.data["filesScanned"], 1);
        assert_eq!(output.data["files"][0]["path"], "src/index.ts");
        assert!(output.tokens_used.unwrap() > 0);
    }
}
