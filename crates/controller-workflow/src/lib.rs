//! The workflow approval engine (§4.5): a one-shot, approval-gated state
//! machine for running a script against one or more target agents, plus the
//! re-execution token escape hatch.

pub mod error;
pub mod executor;
pub mod id;
pub mod service;

pub use error::WorkflowError;
pub use executor::{AgentExecutionResult, HttpScriptExecutor, ScriptExecutor};
pub use service::{CreateWorkflowRequest, ExecuteOverrides, ExecutionOutcome, WorkflowService};
