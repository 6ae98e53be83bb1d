//! Execution of selected plans

pub mod coordinator;

pub use coordinator::{estimate_tokens, CompiledResult, ExecutionCoordinator, ToolResult};
