//! Importance-banded token budgeting for the `smart` strategy
//!
//! Each file is charged a flat estimate from its importance band
//! (critical 800, high 600, medium 400, low 200), capped per file at a share
//! of the total budget. Files are accepted greedily in rank order while the
//! running total stays within the fill ratio, up to a file cap.

use super::models::{FileCandidate, Importance};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smart budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBudgetConfig {
    /// Share of the budget that selected files may consume
    pub fill_ratio: f64,
    /// Per-file ceiling as a share of the budget
    pub per_file_cap_ratio: f64,
    /// Hard cap on selected files
    pub max_files: usize,
    pub critical_tokens: usize,
    pub high_tokens: usize,
    pub medium_tokens: usize,
    pub low_tokens: usize,
}

impl Default for TokenBudgetConfig {
    fn default() -> Self {
        Self {
            fill_ratio: 0.8,
            per_file_cap_ratio: 0.15,
            max_files: 20,
            critical_tokens: 800,
            high_tokens: 600,
            medium_tokens: 400,
            low_tokens: 200,
        }
    }
}

impl TokenBudgetConfig {
    /// Validate that the ratios are usable
    pub fn validate(&self) -> Result<(), BudgetError> {
        for (name, ratio) in [
            ("fill_ratio", self.fill_ratio),
            ("per_file_cap_ratio", self.per_file_cap_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(BudgetError::ConfigurationInvalid(format!(
                    "{name} must be in (0, 1], got {ratio}"
                )));
            }
        }
        if self.max_files == 0 {
            return Err(BudgetError::ConfigurationInvalid(
                "max_files must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Token budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),
}

/// Outcome of a greedy fill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub selected: Vec<FileCandidate>,
    pub estimated_tokens: usize,
    pub limit: usize,
}

impl BudgetAllocation {
    pub fn is_within_budget(&self) -> bool {
        self.estimated_tokens <= self.limit
    }
}

/// Token budget manager
#[derive(Debug, Clone)]
pub struct TokenBudgetManager {
    config: TokenBudgetConfig,
}

impl TokenBudgetManager {
    pub fn new(config: TokenBudgetConfig) -> Result<Self, BudgetError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TokenBudgetConfig {
        &self.config
    }

    /// Flat estimate for one file of the given importance, capped per file
    pub fn estimate_for(&self, importance: Importance, token_budget: usize) -> usize {
        let base = match importance {
            Importance::Critical => self.config.critical_tokens,
            Importance::High => self.config.high_tokens,
            Importance::Medium => self.config.medium_tokens,
            Importance::Low => self.config.low_tokens,
        };
        let cap = (token_budget as f64 * self.config.per_file_cap_ratio).floor() as usize;
        base.min(cap)
    }

    /// Largest total the selected files may reach
    pub fn fill_limit(&self, token_budget: usize) -> usize {
        (token_budget as f64 * self.config.fill_ratio).floor() as usize
    }

    /// Greedily accept ranked candidates that still fit
    pub fn allocate(&self, ranked: Vec<FileCandidate>, token_budget: usize) -> BudgetAllocation {
        let limit = self.fill_limit(token_budget);
        let mut selected = Vec::new();
        let mut total = 0;

        for candidate in ranked {
            if selected.len() >= self.config.max_files {
                break;
            }
            let estimate = self.estimate_for(candidate.importance, token_budget);
            if estimate == 0 || total + estimate > limit {
                continue;
            }
            total += estimate;
            selected.push(candidate);
        }

        BudgetAllocation {
            selected,
            estimated_tokens: total,
            limit,
        }
    }
}

impl Default for TokenBudgetManager {
    fn default() -> Self {
        Self {
            config: TokenBudgetConfig::default(),
        }
    }
}
