//! Tool/bundle selection and token-budgeted context optimization for an
//! LLM-backed developer assistant.
//!
//! A task and a project path go in; the [`selection`] layer picks a strategy
//! plus bundles and tools, [`execution`] runs the plan, [`context`] ranks
//! project files against a token budget and an [`llm`] provider answers.
//! [`assistant::Assistant`] wires the pieces together.

pub mod assistant;
pub mod bundles;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod selection;
pub mod tools;

pub use assistant::{AskReport, Assistant};
pub use config::Config;
pub use error::{ContextError, Result};
