//! Configuration for context-bundler
//!
//! Values come from (lowest to highest precedence) built-in defaults, an
//! optional TOML file and `CONTEXT_BUNDLER__<SECTION>__<KEY>` environment
//! variables.

use crate::context::token_budget::TokenBudgetConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CONTEXT_BUNDLER";

/// Upper bound on `selection.max_bundles`
pub const MAX_BUNDLES_PER_SELECTION: usize = 3;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub bundles: BundlesConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from an optional file plus the environment.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        self.context
            .budget
            .validate()
            .map_err(|e| crate::error::ContextError::Configuration(e.to_string()))?;

        if !(1..=MAX_BUNDLES_PER_SELECTION).contains(&self.selection.max_bundles) {
            return Err(crate::error::ContextError::Configuration(format!(
                "selection.max_bundles must be between 1 and {MAX_BUNDLES_PER_SELECTION}, got {}",
                self.selection.max_bundles
            )));
        }
        if self.selection.cache_evict_count == 0 {
            return Err(crate::error::ContextError::Configuration(
                "selection.cache_evict_count must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.execution.default_relevance) {
            return Err(crate::error::ContextError::Configuration(format!(
                "execution.default_relevance must be in [0, 1], got {}",
                self.execution.default_relevance
            )));
        }
        Ok(())
    }
}

/// Strategy selection and selection cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Selection cache entry lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Entry count above which the oldest entries are evicted
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Entries removed per eviction
    #[serde(default = "default_cache_evict_count")]
    pub cache_evict_count: usize,

    /// Hard cap on bundles per selection
    #[serde(default = "default_max_bundles")]
    pub max_bundles: usize,

    /// Individually ranked tools kept per selection
    #[serde(default = "default_max_individual_tools")]
    pub max_individual_tools: usize,

    /// Complementary bundles added by the tool-first strategy
    #[serde(default = "default_max_complementary_bundles")]
    pub max_complementary_bundles: usize,
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_max_entries() -> usize {
    100
}

fn default_cache_evict_count() -> usize {
    20
}

fn default_max_bundles() -> usize {
    3
}

fn default_max_individual_tools() -> usize {
    5
}

fn default_max_complementary_bundles() -> usize {
    2
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            cache_max_entries: default_cache_max_entries(),
            cache_evict_count: default_cache_evict_count(),
            max_bundles: default_max_bundles(),
            max_individual_tools: default_max_individual_tools(),
            max_complementary_bundles: default_max_complementary_bundles(),
        }
    }
}

impl SelectionConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Context optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_token_budget")]
    pub default_token_budget: usize,

    /// Files kept by the `minimal` strategy
    #[serde(default = "default_minimal_files")]
    pub minimal_files: usize,

    /// Files kept by the `full` strategy
    #[serde(default = "default_full_files")]
    pub full_files: usize,

    #[serde(default = "default_max_sections")]
    pub max_sections_per_file: usize,

    /// Maximum cached optimization results
    #[serde(default = "default_context_cache_capacity")]
    pub cache_capacity: u64,

    #[serde(default)]
    pub budget: TokenBudgetConfig,
}

fn default_token_budget() -> usize {
    8000
}

fn default_minimal_files() -> usize {
    5
}

fn default_full_files() -> usize {
    50
}

fn default_max_sections() -> usize {
    5
}

fn default_context_cache_capacity() -> u64 {
    256
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_token_budget: default_token_budget(),
            minimal_files: default_minimal_files(),
            full_files: default_full_files(),
            max_sections_per_file: default_max_sections(),
            cache_capacity: default_context_cache_capacity(),
            budget: TokenBudgetConfig::default(),
        }
    }
}

/// Tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Type-check and lint timeout in seconds
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout_secs: u64,

    /// Test-suite timeout in seconds
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,

    /// Relevance recorded for tools that do not report one
    #[serde(default = "default_relevance")]
    pub default_relevance: f64,

    #[serde(default = "default_search_max_results")]
    pub search_max_results: usize,

    #[serde(default = "default_tree_max_depth")]
    pub tree_max_depth: usize,

    /// Lines per window hashed by the duplicate finder
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window_lines: usize,
}

fn default_compile_timeout() -> u64 {
    120
}

fn default_test_timeout() -> u64 {
    300
}

fn default_relevance() -> f64 {
    0.8
}

fn default_search_max_results() -> usize {
    50
}

fn default_tree_max_depth() -> usize {
    4
}

fn default_duplicate_window() -> usize {
    6
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            compile_timeout_secs: default_compile_timeout(),
            test_timeout_secs: default_test_timeout(),
            default_relevance: default_relevance(),
            search_max_results: default_search_max_results(),
            tree_max_depth: default_tree_max_depth(),
            duplicate_window_lines: default_duplicate_window(),
        }
    }
}

impl ExecutionConfig {
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }
}

/// Bundle definitions and persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlesConfig {
    /// JSON bundle document, relative paths resolve against the project
    #[serde(default = "default_bundle_config_file")]
    pub config_file: PathBuf,

    /// Directory for the JSON bundle store; in-memory when unset
    #[serde(default)]
    pub store_dir: Option<PathBuf>,

    /// Register the built-in bundles before loading custom ones
    #[serde(default = "default_load_defaults")]
    pub load_defaults: bool,
}

fn default_bundle_config_file() -> PathBuf {
    PathBuf::from(".context-bundler/bundles.json")
}

fn default_load_defaults() -> bool {
    true
}

impl Default for BundlesConfig {
    fn default() -> Self {
        Self {
            config_file: default_bundle_config_file(),
            store_dir: None,
            load_defaults: default_load_defaults(),
        }
    }
}

impl BundlesConfig {
    /// Bundle document location for a project
    pub fn config_file_for(&self, project: &Path) -> PathBuf {
        if self.config_file.is_absolute() {
            self.config_file.clone()
        } else {
            project.join(&self.config_file)
        }
    }
}

/// LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider (null, simulated, anthropic)
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key environment variable
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_provider() -> String {
    "simulated".to_string()
}

fn default_llm_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_retries() -> u32 {
    3
}

fn default_llm_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            api_url: default_api_url(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.selection.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.selection.cache_max_entries, 100);
        assert_eq!(config.selection.max_bundles, 3);
        assert_eq!(config.context.default_token_budget, 8000);
        assert_eq!(config.context.budget.max_files, 20);
        assert_eq!(config.execution.compile_timeout(), Duration::from_secs(120));
        assert_eq!(config.execution.test_timeout(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_with_partial_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[selection]\nmax_bundles = 2\n\n[context.budget]\nmax_files = 10\n\n[llm]\nprovider = \"null\""
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.selection.max_bundles, 2);
        assert_eq!(config.selection.cache_ttl_secs, 300);
        assert_eq!(config.context.budget.max_files, 10);
        assert_eq!(config.context.budget.fill_ratio, 0.8);
        assert_eq!(config.llm.provider, "null");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load(Some(Path::new("/no/such/context-bundler.toml"))).unwrap();
        assert_eq!(config.context.full_files, 50);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.execution.default_relevance = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.selection.max_bundles = 10;
        assert!(config.validate().is_err());
        config.selection.max_bundles = 0;
        assert!(config.validate().is_err());
        config.selection.max_bundles = MAX_BUNDLES_PER_SELECTION;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bundle_config_file_resolution() {
        let bundles = BundlesConfig::default();
        assert_eq!(
            bundles.config_file_for(Path::new("/work/app")),
            PathBuf::from("/work/app/.context-bundler/bundles.json")
        );
    }
}
