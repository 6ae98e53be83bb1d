//! Bundle data model

use crate::selection::Condition;
use crate::tools::TokenCost;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a bundle's tools are run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionOrder {
    #[default]
    Parallel,
    Sequential,
    DependencyBased,
}

/// A named, versioned group of tools for a recurring scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Tool names, unique within the bundle
    pub tools: Vec<String>,
    /// Bundle ids that must run first
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub execution_order: ExecutionOrder,
    #[serde(default)]
    pub priority: f64,
    #[serde(default)]
    pub token_cost: TokenCost,
    /// Seconds
    #[serde(default)]
    pub estimated_time: u64,
    #[serde(default)]
    pub scenarios: Vec<String>,
    /// Substrings of the task that trigger this bundle
    #[serde(default)]
    pub auto_trigger: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_active() -> bool {
    true
}

impl Bundle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: String::new(),
            tools: Vec::new(),
            dependencies: Vec::new(),
            conditions: Vec::new(),
            execution_order: ExecutionOrder::default(),
            priority: 0.0,
            token_cost: TokenCost::default(),
            estimated_time: 0,
            scenarios: Vec::new(),
            auto_trigger: Vec::new(),
            version: default_version(),
            created: now,
            last_modified: now,
            is_default: false,
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_execution_order(mut self, order: ExecutionOrder) -> Self {
        self.execution_order = order;
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_token_cost(mut self, cost: TokenCost) -> Self {
        self.token_cost = cost;
        self
    }

    pub fn with_estimated_time(mut self, seconds: u64) -> Self {
        self.estimated_time = seconds;
        self
    }

    pub fn with_scenarios<I, S>(mut self, scenarios: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scenarios = scenarios.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auto_trigger<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auto_trigger = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn runs_in_parallel(&self) -> bool {
        self.execution_order == ExecutionOrder::Parallel
    }

    /// First duplicated tool name, if any
    pub fn duplicate_tool(&self) -> Option<&str> {
        self.tools
            .iter()
            .enumerate()
            .find(|(i, t)| self.tools[..*i].contains(t))
            .map(|(_, t)| t.as_str())
    }
}

/// Fields accepted when creating a bundle; id and timestamps are assigned
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBundle {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub tools: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub execution_order: ExecutionOrder,
    #[serde(default)]
    pub priority: f64,
    #[serde(default)]
    pub token_cost: TokenCost,
    #[serde(default)]
    pub estimated_time: u64,
    #[serde(default)]
    pub scenarios: Vec<String>,
    #[serde(default)]
    pub auto_trigger: Vec<String>,
}

impl NewBundle {
    pub fn into_bundle(self, id: String) -> Bundle {
        Bundle {
            description: self.description,
            category: self.category,
            tools: self.tools,
            dependencies: self.dependencies,
            conditions: self.conditions,
            execution_order: self.execution_order,
            priority: self.priority,
            token_cost: self.token_cost,
            estimated_time: self.estimated_time,
            scenarios: self.scenarios,
            auto_trigger: self.auto_trigger,
            ..Bundle::new(id, self.name)
        }
    }
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tools: Option<Vec<String>>,
    pub dependencies: Option<Vec<String>>,
    pub conditions: Option<Vec<Condition>>,
    pub execution_order: Option<ExecutionOrder>,
    pub priority: Option<f64>,
    pub token_cost: Option<TokenCost>,
    pub estimated_time: Option<u64>,
    pub scenarios: Option<Vec<String>>,
    pub auto_trigger: Option<Vec<String>>,
    pub version: Option<String>,
    pub is_active: Option<bool>,
}

impl BundleUpdate {
    /// Apply to a bundle and bump `last_modified`
    pub fn apply(self, bundle: &mut Bundle) {
        if let Some(v) = self.name {
            bundle.name = v;
        }
        if let Some(v) = self.description {
            bundle.description = v;
        }
        if let Some(v) = self.category {
            bundle.category = v;
        }
        if let Some(v) = self.tools {
            bundle.tools = v;
        }
        if let Some(v) = self.dependencies {
            bundle.dependencies = v;
        }
        if let Some(v) = self.conditions {
            bundle.conditions = v;
        }
        if let Some(v) = self.execution_order {
            bundle.execution_order = v;
        }
        if let Some(v) = self.priority {
            bundle.priority = v;
        }
        if let Some(v) = self.token_cost {
            bundle.token_cost = v;
        }
        if let Some(v) = self.estimated_time {
            bundle.estimated_time = v;
        }
        if let Some(v) = self.scenarios {
            bundle.scenarios = v;
        }
        if let Some(v) = self.auto_trigger {
            bundle.auto_trigger = v;
        }
        if let Some(v) = self.version {
            bundle.version = v;
        }
        if let Some(v) = self.is_active {
            bundle.is_active = v;
        }
        bundle.last_modified = Utc::now();
    }
}

/// On-disk bundle document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleConfigFile {
    pub bundles: Vec<Bundle>,
    pub last_updated: DateTime<Utc>,
    pub version: String,
}
