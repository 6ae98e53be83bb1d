//! Binary condition evaluation against a selection context

use super::models::{Condition, ConditionType, ConditionValue, Operator, SelectionContext};
use regex::RegexBuilder;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
enum EvaluationError {
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("cannot serialize context: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Value a condition is compared against
enum Actual<'a> {
    Number(f64),
    Text(&'a str),
}

impl Actual<'_> {
    fn as_text(&self) -> String {
        match self {
            Actual::Number(n) => n.to_string(),
            Actual::Text(s) => s.to_string(),
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Actual::Number(n) => *n,
            Actual::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }
}

/// Stateless evaluator returning 1.0 on match and 0.0 otherwise
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Match indicator; evaluation errors count as no match
    pub fn evaluate(&self, condition: &Condition, context: &SelectionContext) -> f64 {
        match self.try_evaluate(condition, context) {
            Ok(true) => 1.0,
            Ok(false) => 0.0,
            Err(e) => {
                debug!("Condition {:?} failed to evaluate: {}", condition.condition_type, e);
                0.0
            }
        }
    }

    /// `Σ evaluate × weight` over all conditions
    pub fn weighted_score(&self, conditions: &[Condition], context: &SelectionContext) -> f64 {
        conditions
            .iter()
            .map(|c| self.evaluate(c, context) * c.weight)
            .sum()
    }

    fn try_evaluate(
        &self,
        condition: &Condition,
        context: &SelectionContext,
    ) -> Result<bool, EvaluationError> {
        let codebase = context.codebase_context.as_ref();

        match condition.condition_type {
            ConditionType::CodebaseSize => match codebase {
                Some(cb) => compare(condition.operator, &Actual::Number(cb.size as f64), &condition.value),
                None => Ok(false),
            },
            ConditionType::Language => match codebase {
                Some(cb) => any_matches(condition, &cb.primary_languages),
                None => Ok(false),
            },
            ConditionType::Framework => match codebase {
                Some(cb) => any_matches(condition, &cb.frameworks),
                None => Ok(false),
            },
            ConditionType::TaskType => {
                compare(condition.operator, &Actual::Text(&context.task), &condition.value)
            }
            ConditionType::Context => {
                let serialized = serde_json::to_string(context)?;
                compare(condition.operator, &Actual::Text(&serialized), &condition.value)
            }
            ConditionType::Custom => Ok(false),
        }
    }
}

fn any_matches(condition: &Condition, values: &[String]) -> Result<bool, EvaluationError> {
    for value in values {
        if compare(condition.operator, &Actual::Text(value), &condition.value)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn compare(operator: Operator, actual: &Actual<'_>, expected: &ConditionValue) -> Result<bool, EvaluationError> {
    let matched = match operator {
        Operator::Equals => match (actual, expected) {
            (Actual::Number(a), ConditionValue::Number(b)) => a == b,
            (Actual::Text(a), ConditionValue::Text(b)) => *a == b.as_str(),
            _ => false,
        },
        Operator::Contains => actual
            .as_text()
            .to_lowercase()
            .contains(&expected.to_string().to_lowercase()),
        // NaN compares false either way
        Operator::GreaterThan => actual.as_f64() > expected.as_f64(),
        Operator::LessThan => actual.as_f64() < expected.as_f64(),
        Operator::MatchesRegex => RegexBuilder::new(&expected.to_string())
            .case_insensitive(true)
            .build()?
            .is_match(&actual.as_text()),
    };
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::models::CodebaseContext;

    fn context(task: &str) -> SelectionContext {
        SelectionContext::new(task, "/work/app").with_codebase(CodebaseContext {
            size: 12000,
            primary_languages: vec!["TypeScript".to_string(), "Python".to_string()],
            frameworks: vec!["react".to_string()],
            complexity: "medium".to_string(),
        })
    }

    fn cond(t: ConditionType, op: Operator, value: impl Into<ConditionValue>) -> Condition {
        Condition::new(t, op, value, 1.0)
    }

    #[test]
    fn test_codebase_size() {
        let evaluator = ConditionEvaluator::new();
        let ctx = context("anything");

        assert_eq!(evaluator.evaluate(&cond(ConditionType::CodebaseSize, Operator::GreaterThan, 10000.0), &ctx), 1.0);
        assert_eq!(evaluator.evaluate(&cond(ConditionType::CodebaseSize, Operator::LessThan, 10000.0), &ctx), 0.0);
        assert_eq!(evaluator.evaluate(&cond(ConditionType::CodebaseSize, Operator::Equals, 12000.0), &ctx), 1.0);
        assert_eq!(evaluator.evaluate(&cond(ConditionType::CodebaseSize, Operator::GreaterThan, "big"), &ctx), 0.0);

        let bare = SelectionContext::new("anything", "/work/app");
        assert_eq!(evaluator.evaluate(&cond(ConditionType::CodebaseSize, Operator::GreaterThan, 0.0), &bare), 0.0);
    }

    #[test]
    fn test_language_any_element() {
        let evaluator = ConditionEvaluator::new();
        let ctx = context("anything");

        assert_eq!(evaluator.evaluate(&cond(ConditionType::Language, Operator::Contains, "python"), &ctx), 1.0);
        // equals is strict
        assert_eq!(evaluator.evaluate(&cond(ConditionType::Language, Operator::Equals, "typescript"), &ctx), 0.0);
        assert_eq!(evaluator.evaluate(&cond(ConditionType::Framework, Operator::Equals, "react"), &ctx), 1.0);
    }

    #[test]
    fn test_task_and_context() {
        let evaluator = ConditionEvaluator::new();
        let ctx = context("Refactor the payment module");

        assert_eq!(evaluator.evaluate(&cond(ConditionType::TaskType, Operator::Contains, "REFACTOR"), &ctx), 1.0);
        assert_eq!(evaluator.evaluate(&cond(ConditionType::TaskType, Operator::MatchesRegex, "^refactor\\s+the"), &ctx), 1.0);
        assert_eq!(evaluator.evaluate(&cond(ConditionType::Context, Operator::Contains, "\"complexity\":\"medium\""), &ctx), 1.0);
        assert_eq!(evaluator.evaluate(&cond(ConditionType::Custom, Operator::Contains, ""), &ctx), 0.0);
    }

    #[test]
    fn test_invalid_regex_is_no_match() {
        let evaluator = ConditionEvaluator::new();
        let ctx = context("anything");
        assert_eq!(evaluator.evaluate(&cond(ConditionType::TaskType, Operator::MatchesRegex, "(unclosed"), &ctx), 0.0);
    }

    #[test]
    fn test_weighted_score() {
        let evaluator = ConditionEvaluator::new();
        let ctx = context("write docs");
        let conditions = vec![
            Condition::new(ConditionType::TaskType, Operator::Contains, "doc", 2.5),
            Condition::new(ConditionType::CodebaseSize, Operator::GreaterThan, 1000.0, 1.0),
            Condition::new(ConditionType::Language, Operator::Equals, "go", 4.0),
        ];
        assert_eq!(evaluator.weighted_score(&conditions, &ctx), 3.5);
    }
}
