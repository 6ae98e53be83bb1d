//! Execution planning: step construction, dependency ordering, cost and
//! time estimation

use super::models::{ExecutionStep, StepKind};
use crate::bundles::Bundle;
use crate::tools::ToolSpec;
use std::collections::{HashMap, HashSet};

/// Seconds charged per sequential step, and once for all parallel steps
pub const STEP_SECONDS: u64 = 15;

/// Planning operations shared by the bundle selector and the strategy layer
pub trait ExecutionPlanner: Send + Sync {
    /// One step per bundle, then one per tool no bundle covers, in
    /// dependency order
    fn create_execution_plan(&self, bundles: &[Bundle], tools: &[ToolSpec]) -> Vec<ExecutionStep> {
        let covered: HashSet<&str> = bundles
            .iter()
            .flat_map(|b| b.tools.iter().map(String::as_str))
            .collect();

        let mut steps: Vec<ExecutionStep> = bundles
            .iter()
            .map(|bundle| ExecutionStep {
                kind: StepKind::Bundle,
                id: bundle.id.clone(),
                name: bundle.name.clone(),
                depends_on: bundle.dependencies.clone(),
                can_run_in_parallel: bundle.runs_in_parallel(),
                order: 0,
            })
            .collect();

        steps.extend(
            tools
                .iter()
                .filter(|tool| !covered.contains(tool.name.as_str()))
                .map(|tool| ExecutionStep {
                    kind: StepKind::Tool,
                    id: tool.name.clone(),
                    name: tool.name.clone(),
                    depends_on: tool.dependencies.clone(),
                    can_run_in_parallel: tool.parallelizable,
                    order: 0,
                }),
        );

        resolve_order(steps)
    }

    /// Weighted cost sum over bundles and tools (low 1, medium 3, high 5)
    fn calculate_token_cost(&self, bundles: &[Bundle], tools: &[ToolSpec]) -> u32 {
        bundles.iter().map(|b| b.token_cost.weight()).sum::<u32>()
            + tools.iter().map(|t| t.token_cost.weight()).sum::<u32>()
    }

    /// One slot for all parallel steps plus one per sequential step
    fn estimate_execution_time(&self, plan: &[ExecutionStep]) -> u64 {
        let parallel = if plan.iter().any(|s| s.can_run_in_parallel) {
            STEP_SECONDS
        } else {
            0
        };
        let sequential = plan.iter().filter(|s| !s.can_run_in_parallel).count() as u64;
        parallel + STEP_SECONDS * sequential
    }
}

/// Something with an id that may require other ids to come first
pub trait Dependent {
    fn key(&self) -> &str;
    fn requires(&self) -> &[String];
}

impl Dependent for ExecutionStep {
    fn key(&self) -> &str {
        &self.id
    }

    fn requires(&self) -> &[String] {
        &self.depends_on
    }
}

/// Depth-first topological order over `depends_on`, dependencies first,
/// with `order` renumbered to the final position
pub fn resolve_order(steps: Vec<ExecutionStep>) -> Vec<ExecutionStep> {
    dependency_order(steps)
        .into_iter()
        .enumerate()
        .map(|(order, mut step)| {
            step.order = order;
            step
        })
        .collect()
}

/// Depth-first topological order, dependencies first.
///
/// Unknown dependency ids are ignored. An item already on the DFS stack is
/// not revisited, so accidental cycles terminate. Items with no ordering
/// constraint keep their input order.
pub fn dependency_order<T: Dependent>(items: Vec<T>) -> Vec<T> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        index.entry(item.key()).or_insert(i);
    }

    let mut visited = vec![false; items.len()];
    let mut visiting = vec![false; items.len()];
    let mut sequence = Vec::with_capacity(items.len());

    fn visit<T: Dependent>(
        i: usize,
        items: &[T],
        index: &HashMap<&str, usize>,
        visited: &mut [bool],
        visiting: &mut [bool],
        sequence: &mut Vec<usize>,
    ) {
        if visited[i] || visiting[i] {
            return;
        }
        visiting[i] = true;
        for dep in items[i].requires() {
            if let Some(&j) = index.get(dep.as_str()) {
                visit(j, items, index, visited, visiting, sequence);
            }
        }
        visiting[i] = false;
        visited[i] = true;
        sequence.push(i);
    }

    for i in 0..items.len() {
        visit(i, &items, &index, &mut visited, &mut visiting, &mut sequence);
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    sequence.into_iter().filter_map(|i| slots[i].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundles::ExecutionOrder;
    use crate::tools::TokenCost;

    struct Planner;
    impl ExecutionPlanner for Planner {}

    fn step(id: &str, deps: &[&str], parallel: bool) -> ExecutionStep {
        ExecutionStep {
            kind: StepKind::Tool,
            id: id.to_string(),
            name: id.to_string(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            can_run_in_parallel: parallel,
            order: 0,
        }
    }

    fn position(plan: &[ExecutionStep], id: &str) -> usize {
        plan.iter().position(|s| s.id == id).unwrap()
    }

    #[test]
    fn test_dependencies_come_first() {
        let plan = resolve_order(vec![
            step("deploy", &["test", "build"], false),
            step("test", &["build"], false),
            step("build", &[], false),
            step("lint", &["missing"], true),
        ]);

        assert_eq!(plan.len(), 4);
        assert!(position(&plan, "build") < position(&plan, "test"));
        assert!(position(&plan, "test") < position(&plan, "deploy"));
        assert!(plan.iter().enumerate().all(|(i, s)| s.order == i));
    }

    #[test]
    fn test_cycles_terminate() {
        let plan = resolve_order(vec![step("a", &["b"], true), step("b", &["a"], true)]);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_plan_skips_tools_covered_by_bundles() {
        let bundle = Bundle::new("review", "Review")
            .with_tools(["lint", "search"])
            .with_execution_order(ExecutionOrder::Sequential);
        let tools = vec![
            ToolSpec::new("lint", ""),
            ToolSpec::new("search", ""),
            ToolSpec::new("tree", ""),
        ];

        let plan = Planner.create_execution_plan(&[bundle], &tools);
        let ids: Vec<&str> = plan.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["review", "tree"]);
        assert_eq!(plan[0].kind, StepKind::Bundle);
        assert!(!plan[0].can_run_in_parallel);
        assert!(plan[1].can_run_in_parallel);
    }

    #[test]
    fn test_cost_and_time() {
        let bundles = vec![Bundle::new("b", "B").with_token_cost(TokenCost::High)];
        let tools = vec![
            ToolSpec::new("x", "").with_token_cost(TokenCost::Low),
            ToolSpec::new("y", ""),
        ];
        assert_eq!(Planner.calculate_token_cost(&bundles, &tools), 9);

        let plan = vec![step("p1", &[], true), step("p2", &[], true), step("s1", &[], false)];
        assert_eq!(Planner.estimate_execution_time(&plan), 30);
        assert_eq!(Planner.estimate_execution_time(&[]), 0);
    }
}
