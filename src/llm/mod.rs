//! Question-answering providers fed with an optimized context

use crate::config::LlmConfig;
use crate::context::OptimizedContext;
use crate::error::{ContextError, Result};
use crate::execution::{CompiledResult, ToolResult};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

pub mod anthropic;

pub use anthropic::AnthropicProvider;

/// Characters of a single tool's JSON output rendered into a prompt
const MAX_TOOL_OUTPUT_CHARS: usize = 4_000;

/// Project files plus the tool results gathered for a question
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub files: &'a OptimizedContext,
    pub tool_results: &'a [ToolResult],
    /// Aggregate over `tool_results`
    pub tools: CompiledResult,
}

impl<'a> PromptContext<'a> {
    pub fn new(files: &'a OptimizedContext) -> Self {
        Self {
            files,
            tool_results: &[],
            tools: CompiledResult::default(),
        }
    }

    pub fn with_tool_results(mut self, results: &'a [ToolResult]) -> Self {
        self.tools = CompiledResult::compile(results);
        self.tool_results = results;
        self
    }

    /// Results of tools that succeeded, in run order
    pub fn successful_tools(&self) -> impl Iterator<Item = &'a ToolResult> {
        let results: &'a [ToolResult] = self.tool_results;
        results.iter().filter(|r| r.success)
    }
}

/// What the provider was given to work with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUsed {
    pub tokens_used: usize,
    pub files_included: Vec<String>,
    pub optimization_strategy: String,
    pub tools_used: Vec<String>,
    pub tool_tokens: u64,
    pub average_relevance: f64,
}

impl ContextUsed {
    pub fn from_context(context: &PromptContext<'_>) -> Self {
        Self {
            tokens_used: context.files.estimated_tokens,
            files_included: context.files.file_paths(),
            optimization_strategy: context.files.strategy.to_string(),
            tools_used: context.tools.tools_used.clone(),
            tool_tokens: context.tools.total_tokens,
            average_relevance: context.tools.average_relevance,
        }
    }
}

/// Token usage as reported by the API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResponse {
    pub content: String,
    pub context_used: ContextUsed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Black-box question answering service
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn ask_question(&self, question: &str, context: &PromptContext<'_>) -> Result<LlmResponse>;
}

/// Answers with a fixed notice
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProvider;

#[async_trait]
impl LlmProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    async fn ask_question(&self, _question: &str, context: &PromptContext<'_>) -> Result<LlmResponse> {
        Ok(LlmResponse {
            content: "No LLM provider is configured; set llm.provider to answer questions.".to_string(),
            context_used: ContextUsed::from_context(context),
            usage: None,
        })
    }
}

/// Deterministic offline answer summarizing the supplied context
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedProvider;

#[async_trait]
impl LlmProvider for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn ask_question(&self, question: &str, context: &PromptContext<'_>) -> Result<LlmResponse> {
        let files = context.files;
        let mut content = format!("[simulated] {question}\n");
        if files.files.is_empty() {
            content.push_str("No project files were included.\n");
        } else {
            let _ = writeln!(
                content,
                "Context: {} files, ~{} tokens ({} strategy)",
                files.files.len(),
                files.estimated_tokens,
                files.strategy
            );
            for file in &files.files {
                let _ = writeln!(content, "- {} ({})", file.path.display(), file.importance.as_str());
            }
        }
        if !context.tools.tools_used.is_empty() {
            let _ = writeln!(
                content,
                "Tools: {} (~{} tokens)",
                context.tools.tools_used.join(", "),
                context.tools.total_tokens
            );
        }

        Ok(LlmResponse {
            content,
            context_used: ContextUsed::from_context(context),
            usage: None,
        })
    }
}

/// Render the prompt body: each file's summary and sections, then the
/// output of every successful tool, then the question
pub fn build_prompt(question: &str, context: &PromptContext<'_>) -> String {
    let mut prompt = String::new();

    if !context.files.files.is_empty() {
        prompt.push_str("Relevant project context:\n\n");
        for file in &context.files.files {
            let _ = writeln!(prompt, "## {} [{}]", file.path.display(), file.language);
            if let Some(summary) = &file.summary {
                let _ = writeln!(prompt, "{summary}");
            }
            for section in &file.relevant_sections {
                let _ = writeln!(
                    prompt,
                    "```{}\n// lines {}-{}\n{}\n```",
                    file.language, section.start_line, section.end_line, section.content
                );
            }
            prompt.push('\n');
        }
    }

    let mut tools = context.successful_tools().peekable();
    if tools.peek().is_some() {
        prompt.push_str("Tool findings:\n\n");
        for result in tools {
            let data = serde_json::to_string_pretty(&result.data).unwrap_or_default();
            let _ = writeln!(
                prompt,
                "### {} (relevance {:.2})\n```json\n{}\n```\n",
                result.tool,
                result.relevance_score,
                truncate_chars(&data, MAX_TOOL_OUTPUT_CHARS)
            );
        }
    }

    let _ = write!(prompt, "Question: {question}");
    prompt
}

fn truncate_chars(text: &str, max: usize) -> std::borrow::Cow<'_, str> {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]).into(),
        None => text.into(),
    }
}

/// Provider named by `llm.provider`
pub fn provider_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.provider.to_lowercase().as_str() {
        "null" | "none" => Arc::new(NullProvider),
        "simulated" => Arc::new(SimulatedProvider),
        "anthropic" | "claude" => {
            let key = std::env::var(&config.api_key_env).map_err(|_| {
                ContextError::Configuration(format!(
                    "{} must be set for the anthropic provider",
                    config.api_key_env
                ))
            })?;
            Arc::new(AnthropicProvider::new(config, SecretString::new(key))?)
        }
        other => {
            return Err(ContextError::Configuration(format!(
                "unknown llm provider: {other}"
            )))
        }
    };

    info!("Using {} LLM provider", provider.name());
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CodeSection, FileCandidate, SectionKind};
    use std::path::PathBuf;

    fn context() -> OptimizedContext {
        let mut file = FileCandidate::new(PathBuf::from("src/auth.ts"), 32, "typescript");
        file.summary = Some("Login and session handling".to_string());
        file.relevant_sections.push(CodeSection {
            start_line: 3,
            end_line: 5,
            content: "export function login() {\n  return true;\n}".to_string(),
            kind: SectionKind::Function,
            relevance_score: 10,
        });

        let mut context = OptimizedContext::empty("/work/app", "how does login work");
        context.files.push(file);
        context.estimated_tokens = 120;
        context
    }

    fn tool_results() -> Vec<ToolResult> {
        let result = |tool: &str, success: bool, data: serde_json::Value| ToolResult {
            tool: tool.to_string(),
            success,
            data,
            tokens_used: if success { 12 } else { 0 },
            execution_time_ms: 3,
            relevance_score: if success { 0.9 } else { 0.0 },
            error: (!success).then(|| "npx not found".to_string()),
        };
        vec![
            result("code_search", true, serde_json::json!({ "matches": ["src/auth.ts:3 login"] })),
            result("lint_check", false, serde_json::Value::Null),
        ]
    }

    #[tokio::test]
    async fn test_simulated_provider_is_deterministic() {
        let ctx = context();
        let prompt = PromptContext::new(&ctx);
        let a = SimulatedProvider.ask_question("how does login work", &prompt).await.unwrap();
        let b = SimulatedProvider.ask_question("how does login work", &prompt).await.unwrap();

        assert_eq!(a, b);
        assert!(a.content.contains("src/auth.ts (critical)"));
        assert_eq!(a.context_used.tokens_used, 120);
        assert_eq!(a.context_used.files_included, vec!["src/auth.ts"]);
        assert!(a.context_used.tools_used.is_empty());
    }

    #[tokio::test]
    async fn test_null_provider_reports_context() {
        let ctx = context();
        let response = NullProvider.ask_question("anything", &PromptContext::new(&ctx)).await.unwrap();
        assert!(response.content.contains("No LLM provider"));
        assert_eq!(response.context_used.optimization_strategy, "minimal");
    }

    #[tokio::test]
    async fn test_context_used_reports_successful_tools() {
        let ctx = context();
        let results = tool_results();
        let prompt = PromptContext::new(&ctx).with_tool_results(&results);

        let response = SimulatedProvider.ask_question("how does login work", &prompt).await.unwrap();
        assert_eq!(response.context_used.tools_used, vec!["code_search"]);
        assert_eq!(response.context_used.tool_tokens, 12);
        assert!((response.context_used.average_relevance - 0.9).abs() < 1e-9);
        assert!(response.content.contains("Tools: code_search (~12 tokens)"));
    }

    #[test]
    fn test_prompt_includes_sections() {
        let ctx = context();
        let prompt = build_prompt("how does login work", &PromptContext::new(&ctx));
        assert!(prompt.contains("## src/auth.ts [typescript]"));
        assert!(prompt.contains("// lines 3-5"));
        assert!(!prompt.contains("Tool findings"));
        assert!(prompt.ends_with("Question: how does login work"));
    }

    #[test]
    fn test_prompt_includes_successful_tool_output() {
        let ctx = context();
        let results = tool_results();
        let prompt = build_prompt("how does login work", &PromptContext::new(&ctx).with_tool_results(&results));

        assert!(prompt.contains("### code_search (relevance 0.90)"));
        assert!(prompt.contains("src/auth.ts:3 login"));
        assert!(!prompt.contains("lint_check"));
        assert!(prompt.ends_with("Question: how does login work"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("ééééé", 2), "éé...");
    }

    #[test]
    fn test_provider_selection() {
        let mut config = LlmConfig::default();
        assert_eq!(provider_from_config(&config).unwrap().name(), "simulated");

        config.provider = "null".to_string();
        assert_eq!(provider_from_config(&config).unwrap().name(), "null");

        config.provider = "gpt".to_string();
        assert!(provider_from_config(&config).is_err());

        config.provider = "anthropic".to_string();
        config.api_key_env = "CONTEXT_BUNDLER_TEST_UNSET_KEY".to_string();
        assert!(provider_from_config(&config).is_err());
    }
}
