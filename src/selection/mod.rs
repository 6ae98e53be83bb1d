//! Bundle and tool selection
//!
//! A task is classified into one of four strategies, the matching selection
//! path picks bundles and individual tools, and the planner orders them into
//! an execution plan. Results are cached per context.

pub mod cache;
pub mod conditions;
pub mod models;
pub mod planner;
pub mod selector;
pub mod strategy;

pub use cache::{cache_key, Clock, ManualClock, SelectionCache, SystemClock};
pub use conditions::ConditionEvaluator;
pub use models::{
    CodebaseContext, Condition, ConditionType, ConditionValue, EnhancedSelectionResult,
    ExecutionStep, Operator, SelectionContext, SelectionResult, SelectionStrategy, StepKind,
};
pub use planner::{dependency_order, resolve_order, Dependent, ExecutionPlanner, STEP_SECONDS};
pub use selector::{BundleSelector, RankedTool, ScoredBundle};
pub use strategy::{determine_selection_strategy, refine_confidence, tool_overlap, StrategySelector};
