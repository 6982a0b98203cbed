//! The abstract repository boundary (§6 "persisted schema"). `spec.md`
//! treats the persistent store as an external collaborator exposing a
//! fixed set of queries; this crate defines that boundary as a set of
//! narrow traits (one per aggregate root, per REDESIGN FLAGS §9's
//! "duck-typed repository" note) plus a single in-memory implementation of
//! each, used by the binary until a real database-backed implementation is
//! plugged in.

pub mod agents;
pub mod error;
pub mod models;
pub mod reexec;
pub mod reports;
pub mod tokens;
pub mod users;
pub mod workflows;

use std::sync::Arc;

pub use error::StoreError;

use agents::{AgentRepository, InMemoryAgentRepository};
use reexec::{InMemoryReexecRepository, ReexecRepository};
use reports::{InMemoryReportRunRepository, InMemoryReportScriptRepository, ReportRunRepository, ReportScriptRepository};
use tokens::{
	BearerTokenRepository, ExecutionTokenRepository, InMemoryBearerTokenRepository, InMemoryExecutionTokenRepository,
	PrincipalDirectoryImpl,
};
use users::{InMemoryUserRepository, UserRepository};
use workflows::{InMemoryWorkflowRepository, WorkflowRepository};

/// The full set of repositories the controller's services are built
/// against: one cheaply-clonable handle bundling a trait object per
/// aggregate root.
#[derive(Clone)]
pub struct Stores {
	pub agents: Arc<dyn AgentRepository>,
	pub users: Arc<dyn UserRepository>,
	pub workflows: Arc<dyn WorkflowRepository>,
	pub report_scripts: Arc<dyn ReportScriptRepository>,
	pub report_runs: Arc<dyn ReportRunRepository>,
	pub bearer_tokens: Arc<dyn BearerTokenRepository>,
	pub execution_tokens: Arc<dyn ExecutionTokenRepository>,
	/// Same underlying repository as `execution_tokens`, exposed through the
	/// narrower trait the auth crate's resolver depends on so that crate
	/// stays free of a dependency on this one.
	pub execution_token_directory: Arc<dyn controller_auth::resolver::ExecutionTokenDirectory>,
	pub reexec_requests: Arc<dyn ReexecRepository>,
	pub principal_directory: Arc<PrincipalDirectoryImpl>,
}

impl Stores {
	/// Wires up the in-memory implementation of every repository. Suitable
	/// for tests and for single-replica deployments that accept losing
	/// state on restart (§1 Non-goals: "consensus across controller
	/// replicas" is out of scope, consistent with a single-writer,
	/// single-process store).
	pub fn in_memory() -> Self {
		let agents: Arc<dyn AgentRepository> = Arc::new(InMemoryAgentRepository::new());
		let users: Arc<dyn UserRepository> = Arc::new(InMemoryUserRepository::new());
		let workflows: Arc<dyn WorkflowRepository> = Arc::new(InMemoryWorkflowRepository::new());
		let report_scripts: Arc<dyn ReportScriptRepository> = Arc::new(InMemoryReportScriptRepository::new());
		let report_runs: Arc<dyn ReportRunRepository> = Arc::new(InMemoryReportRunRepository::new());
		let bearer_tokens: Arc<dyn BearerTokenRepository> = Arc::new(InMemoryBearerTokenRepository::new());
		let execution_tokens_impl = Arc::new(InMemoryExecutionTokenRepository::new());
		let execution_tokens: Arc<dyn ExecutionTokenRepository> = execution_tokens_impl.clone();
		let execution_token_directory: Arc<dyn controller_auth::resolver::ExecutionTokenDirectory> = execution_tokens_impl;
		let reexec_requests: Arc<dyn ReexecRepository> = Arc::new(InMemoryReexecRepository::new());
		let principal_directory = Arc::new(PrincipalDirectoryImpl::new(users.clone(), bearer_tokens.clone()));

		Self {
			agents,
			users,
			workflows,
			report_scripts,
			report_runs,
			bearer_tokens,
			execution_tokens,
			execution_token_directory,
			reexec_requests,
			principal_directory,
		}
	}
}
