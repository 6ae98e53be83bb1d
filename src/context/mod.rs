//! Context optimization with token budget enforcement
//!
//! Scores project files by path heuristics, cuts the ranked list according
//! to a strategy (minimal, smart, full) and extracts the declaration
//! sections most relevant to the query.

pub mod file_scorer;
pub mod models;
pub mod optimizer;
pub mod scanner;
pub mod sections;
pub mod token_budget;
pub mod token_estimator;

pub use file_scorer::FileScorer;
pub use models::{
    CodeSection, FileCandidate, Importance, OptimizationRequest, OptimizationStrategy,
    OptimizedContext, SectionKind,
};
pub use optimizer::ContextOptimizer;
pub use scanner::ProjectScanner;
pub use sections::SectionExtractor;
pub use token_budget::{BudgetAllocation, BudgetError, TokenBudgetConfig, TokenBudgetManager};
pub use token_estimator::{CharRatioEstimator, TokenEstimator};
