//! Built-in bundles

use super::models::{Bundle, ExecutionOrder};
use crate::selection::{Condition, ConditionType, Operator};
use crate::tools::analysis::{CONFIG_SCANNER, DUPLICATE_FINDER, PROJECT_TREE};
use crate::tools::context::CONTEXT_OPTIMIZER;
use crate::tools::quality::{LINT_CHECK, TEST_RUNNER, TYPE_CHECK};
use crate::tools::search::{CODE_SEARCH, FILE_LIST};
use crate::tools::TokenCost;

pub fn default_bundles() -> Vec<Bundle> {
    vec![
        Bundle::new("code-review", "Code Review")
            .with_description("Lint, search and duplicate scan over the code relevant to a change")
            .with_category("quality")
            .with_tools([CONTEXT_OPTIMIZER, CODE_SEARCH, LINT_CHECK, DUPLICATE_FINDER])
            .with_conditions(vec![Condition::new(
                ConditionType::TaskType,
                Operator::Contains,
                "review",
                3.0,
            )])
            .with_execution_order(ExecutionOrder::Parallel)
            .with_priority(6.0)
            .with_token_cost(TokenCost::Medium)
            .with_estimated_time(60)
            .with_scenarios(["code review", "review changes", "pr review"])
            .with_auto_trigger(["review", "pull request"])
            .as_default(),
        Bundle::new("refactoring", "Refactoring")
            .with_description("Locate duplication and usages, then type-check the result")
            .with_category("maintenance")
            .with_tools([CONTEXT_OPTIMIZER, DUPLICATE_FINDER, CODE_SEARCH, TYPE_CHECK])
            .with_conditions(vec![
                Condition::new(ConditionType::CodebaseSize, Operator::GreaterThan, 1000.0, 1.0),
                Condition::new(
                    ConditionType::TaskType,
                    Operator::MatchesRegex,
                    "refactor|restructure|clean ?up",
                    3.0,
                ),
            ])
            .with_execution_order(ExecutionOrder::DependencyBased)
            .with_priority(5.0)
            .with_token_cost(TokenCost::High)
            .with_estimated_time(120)
            .with_scenarios(["refactor module", "extract function", "remove duplication"])
            .with_auto_trigger(["refactor", "restructure", "duplicate"])
            .as_default(),
        Bundle::new("testing", "Testing")
            .with_description("Type-check and run the test suite")
            .with_category("quality")
            .with_tools([TYPE_CHECK, TEST_RUNNER, CODE_SEARCH])
            .with_conditions(vec![Condition::new(
                ConditionType::TaskType,
                Operator::Contains,
                "test",
                3.0,
            )])
            .with_execution_order(ExecutionOrder::Sequential)
            .with_priority(5.0)
            .with_token_cost(TokenCost::High)
            .with_estimated_time(300)
            .with_scenarios(["write tests", "fix failing tests", "improve coverage"])
            .with_auto_trigger(["test", "coverage"])
            .as_default(),
        Bundle::new("documentation", "Documentation")
            .with_description("Project layout and key files for writing docs")
            .with_category("docs")
            .with_tools([CONTEXT_OPTIMIZER, PROJECT_TREE, FILE_LIST])
            .with_conditions(vec![Condition::new(
                ConditionType::TaskType,
                Operator::Contains,
                "doc",
                2.0,
            )])
            .with_execution_order(ExecutionOrder::Parallel)
            .with_priority(4.0)
            .with_token_cost(TokenCost::Low)
            .with_estimated_time(20)
            .with_scenarios(["write documentation", "update readme"])
            .with_auto_trigger(["document", "readme"])
            .as_default(),
        Bundle::new("config-audit", "Configuration Audit")
            .with_description("Find scattered configuration and hard-coded values")
            .with_category("maintenance")
            .with_tools([CONFIG_SCANNER, CODE_SEARCH])
            .with_execution_order(ExecutionOrder::Parallel)
            .with_priority(4.0)
            .with_token_cost(TokenCost::Low)
            .with_estimated_time(15)
            .with_scenarios(["centralize config", "audit configuration"])
            .with_auto_trigger(["config", "environment variable", "hardcoded", "secret"])
            .as_default(),
        Bundle::new("architecture-review", "Architecture Review")
            .with_description("Structure, duplication and configuration overview of a codebase")
            .with_category("architecture")
            .with_tools([PROJECT_TREE, CONTEXT_OPTIMIZER, DUPLICATE_FINDER, CONFIG_SCANNER])
            .with_conditions(vec![
                Condition::new(ConditionType::CodebaseSize, Operator::GreaterThan, 10000.0, 2.0),
                Condition::new(ConditionType::TaskType, Operator::Contains, "architecture", 3.0),
            ])
            .with_execution_order(ExecutionOrder::Parallel)
            .with_priority(6.0)
            .with_token_cost(TokenCost::High)
            .with_estimated_time(90)
            .with_scenarios(["architecture review", "codebase overview"])
            .with_auto_trigger(["architecture", "design review"])
            .as_default(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_bundles_are_well_formed() {
        let bundles = default_bundles();
        let ids: HashSet<&str> = bundles.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids.len(), bundles.len());

        for bundle in &bundles {
            assert!(bundle.is_default);
            assert!(bundle.is_active);
            assert!(!bundle.tools.is_empty());
            assert_eq!(bundle.duplicate_tool(), None, "{}", bundle.id);
        }
    }
}
