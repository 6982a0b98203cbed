use std::sync::Arc;

use chrono::{Duration, Utc};

use serde::{Deserialize, Serialize};

use controller_store::Stores;
use controller_store::models::{AuditEntry, Workflow, WorkflowStatus};
use controller_notify::{AgentExitCode, NotificationEvent, Notifier};

use crate::error::WorkflowError;
use crate::executor::{AgentExecutionResult, ScriptExecutor};
use crate::id::{new_request_id, new_workflow_id};

/// `POST /workflows` request shape (§3 Workflow, §6).
#[derive(Clone, Debug, Deserialize)]
pub struct CreateWorkflowRequest {
	pub script_id: String,
	pub targets: Vec<String>,
	pub requestor: String,
	pub requestor_email: Option<String>,
	pub reason: String,
	pub required_approval_levels: u32,
	pub notify_email: Option<String>,
	pub ttl_minutes: i64,
	pub script_params: serde_json::Map<String, serde_json::Value>,
}

/// `POST /workflows/{id}/execute` request shape (§4.5 step 3: "request
/// supplied override stored `script_params`; environment and timeout
/// overrides accepted").
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExecuteOverrides {
	pub script_params: Option<serde_json::Map<String, serde_json::Value>>,
	pub environment_override: Option<String>,
	pub timeout_override: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExecutionOutcome {
	pub workflow: Workflow,
	pub results: Vec<AgentExecutionResult>,
}

/// Default lifetime of a minted re-execution token (§4.5: "short-lived").
const REEXEC_TOKEN_TTL: Duration = Duration::minutes(30);

pub struct WorkflowService {
	stores: Stores,
	executor: Arc<dyn ScriptExecutor>,
	notifier: Arc<Notifier>,
}

impl WorkflowService {
	pub fn new(stores: Stores, executor: Arc<dyn ScriptExecutor>, notifier: Arc<Notifier>) -> Self {
		Self {
			stores,
			executor,
			notifier,
		}
	}

	async fn audit(&self, workflow_id: &str, action: &str, user: &str, note: Option<String>) {
		self
			.stores
			.workflows
			.append_audit(AuditEntry {
				workflow_id: workflow_id.to_string(),
				ts: Utc::now(),
				action: action.to_string(),
				user: user.to_string(),
				note,
			})
			.await;
	}

	pub async fn create(&self, req: CreateWorkflowRequest) -> Result<Workflow, WorkflowError> {
		if req.targets.is_empty() {
			return Err(WorkflowError::Validation("targets must not be empty".to_string()));
		}
		if req.required_approval_levels < 1 {
			return Err(WorkflowError::Validation(
				"required_approval_levels must be at least 1".to_string(),
			));
		}
		if req.ttl_minutes <= 0 {
			return Err(WorkflowError::Validation("ttl_minutes must be positive".to_string()));
		}

		let now = Utc::now();
		let workflow = Workflow {
			workflow_id: new_workflow_id(),
			script_id: req.script_id.clone(),
			targets: req.targets.clone(),
			requestor: req.requestor.clone(),
			requestor_email: req.requestor_email.clone(),
			reason: req.reason.clone(),
			required_approval_levels: req.required_approval_levels,
			notify_email: req.notify_email.clone(),
			ttl_minutes: req.ttl_minutes,
			script_params: req.script_params.clone(),
			status: WorkflowStatus::Pending,
			created_at: now,
			expires_at: now + Duration::minutes(req.ttl_minutes),
			approvals: Vec::new(),
			denial_reason: None,
		};
		let created = self.stores.workflows.create(workflow).await;
		self
			.audit(&created.workflow_id, "created", &created.requestor, None)
			.await;
		self
			.notifier
			.notify(NotificationEvent::WorkflowCreated {
				workflow_id: created.workflow_id.clone(),
				approver_email: created.notify_email.clone().unwrap_or_default(),
				requestor: created.requestor.clone(),
				script_id: created.script_id.clone(),
				targets: created.targets.clone(),
			})
			.await;
		Ok(created)
	}

	pub async fn get(&self, workflow_id: &str) -> Result<Workflow, WorkflowError> {
		Ok(self.stores.workflows.get(workflow_id).await?)
	}

	pub async fn list(&self) -> Vec<Workflow> {
		self.stores.workflows.list().await
	}

	pub async fn audit_log(&self, workflow_id: &str) -> Vec<AuditEntry> {
		self.stores.workflows.list_audit(workflow_id).await
	}

	/// `POST /workflows/{id}/approve` (§4.5 approval rules).
	pub async fn approve(&self, workflow_id: &str, approver: &str, level: u32) -> Result<WorkflowStatus, WorkflowError> {
		let status = self.stores.workflows.record_approval(workflow_id, approver, level).await?;
		self
			.audit(workflow_id, "approved", approver, Some(format!("level {level}")))
			.await;
		if status == WorkflowStatus::Approved {
			let workflow = self.stores.workflows.get(workflow_id).await?;
			self
				.notifier
				.notify(NotificationEvent::WorkflowApproved {
					workflow_id: workflow_id.to_string(),
					requestor_email: workflow.requestor_email.clone().unwrap_or_default(),
					approved_by: approver.to_string(),
				})
				.await;
		}
		Ok(status)
	}

	/// `POST /workflows/{id}/deny`.
	pub async fn deny(&self, workflow_id: &str, approver: &str, reason: Option<String>) -> Result<(), WorkflowError> {
		self
			.stores
			.workflows
			.deny(workflow_id, approver, reason.clone())
			.await?;
		self.audit(workflow_id, "denied", approver, reason.clone()).await;
		let workflow = self.stores.workflows.get(workflow_id).await?;
		self
			.notifier
			.notify(NotificationEvent::WorkflowDenied {
				workflow_id: workflow_id.to_string(),
				requestor_email: workflow.requestor_email.clone().unwrap_or_default(),
				denied_by: approver.to_string(),
				reason,
			})
			.await;
		Ok(())
	}

	/// `POST /workflows/{id}/execute` (§4.5 steps 1-6). `reexec_token_consumed`
	/// must already reflect a successful `require_execution_token` call at
	/// the auth layer — this method does not itself validate the token, it
	/// only decides whether the one-shot guard is bypassed.
	pub async fn execute(
		&self,
		workflow_id: &str,
		overrides: ExecuteOverrides,
		reexec_token_consumed: bool,
	) -> Result<ExecutionOutcome, WorkflowError> {
		let workflow = if reexec_token_consumed {
			self.stores.workflows.force_reexecute(workflow_id).await?
		} else {
			self.stores.workflows.begin_execute(workflow_id).await?
		};

		if workflow.script_id.is_empty() || workflow.targets.is_empty() {
			// Transition back out of `executing` so the workflow is not stuck;
			// this is a data-integrity failure, not a normal dispatch outcome.
			self.stores.workflows.finish_execute(workflow_id, false).await.ok();
			return Err(WorkflowError::Validation(
				"workflow has no script_id or no targets".to_string(),
			));
		}

		let mut dispatch_workflow = workflow.clone();
		if let Some(params) = overrides.script_params {
			for (k, v) in params {
				dispatch_workflow.script_params.insert(k, v);
			}
		}

		let mut targets = Vec::with_capacity(workflow.targets.len());
		for name in &workflow.targets {
			match self.stores.agents.get(name).await {
				Ok(agent) => targets.push(agent),
				Err(_) => {
					self.stores.workflows.finish_execute(workflow_id, false).await.ok();
					self
						.audit(workflow_id, "failed", "system", Some(format!("unknown target agent '{name}'")))
						.await;
					return Err(WorkflowError::Validation(format!("unknown target agent '{name}'")));
				},
			}
		}

		let results = self.executor.dispatch(&dispatch_workflow, &targets).await;

		// Per §4.5 step 6: any non-exception return transitions to
		// `executed`, regardless of individual exit codes; the executor
		// never raises (transport failures are captured per-target), so
		// this path always succeeds.
		self.stores.workflows.finish_execute(workflow_id, true).await?;
		self
			.audit(workflow_id, "executed", "system", None)
			.await;

		let final_workflow = self.stores.workflows.get(workflow_id).await?;
		self
			.notifier
			.notify(NotificationEvent::WorkflowExecuted {
				workflow_id: workflow_id.to_string(),
				requestor_email: final_workflow.requestor_email.clone().unwrap_or_default(),
				results: results
					.iter()
					.map(|r| AgentExitCode {
						agent_name: r.agent_name.clone(),
						exit_code: r.exit_code,
					})
					.collect(),
			})
			.await;

		Ok(ExecutionOutcome {
			workflow: final_workflow,
			results,
		})
	}

	/// `POST /workflows/{id}/reexec/request`.
	pub async fn request_reexec(
		&self,
		workflow_id: &str,
		requester: &str,
		requester_email: Option<String>,
		note: Option<String>,
	) -> Result<controller_store::models::ReexecRequest, WorkflowError> {
		let workflow = self.stores.workflows.get(workflow_id).await?;
		let request = controller_store::models::ReexecRequest {
			request_id: new_request_id(),
			workflow_id: workflow_id.to_string(),
			requester: requester.to_string(),
			requester_email: requester_email.clone(),
			note: note.clone(),
			status: controller_store::models::ReexecStatus::Pending,
			created_at: Utc::now(),
		};
		let created = self.stores.reexec_requests.create(request).await;
		self
			.audit(workflow_id, "reexec_requested", requester, note.clone())
			.await;
		self
			.notifier
			.notify(NotificationEvent::ReexecRequested {
				workflow_id: workflow_id.to_string(),
				approver_email: workflow.notify_email.clone().unwrap_or_default(),
				requester: requester.to_string(),
				note,
			})
			.await;
		Ok(created)
	}

	/// `POST /workflows/{id}/reexec/approve`: atomically marks the request
	/// approved and mints a single-use [`controller_auth::ExecutionToken`]
	/// bound to the workflow.
	pub async fn approve_reexec(
		&self,
		request_id: &str,
	) -> Result<controller_auth::ExecutionToken, WorkflowError> {
		let request = self.stores.reexec_requests.mark_approved(request_id).await?;
		let workflow = self.stores.workflows.get(&request.workflow_id).await?;
		let token = self
			.stores
			.execution_tokens
			.issue(&request.workflow_id, REEXEC_TOKEN_TTL)
			.await;
		self
			.audit(&request.workflow_id, "reexec_approved", &request.requester, None)
			.await;
		self
			.notifier
			.notify(NotificationEvent::ReexecApproved {
				workflow_id: request.workflow_id.clone(),
				requestor_email: workflow.requestor_email.clone().unwrap_or_default(),
				token: token.token.clone(),
			})
			.await;
		Ok(token)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use controller_notify::LogMailer;
	use controller_store::models::{Agent, AgentStatus, Environment};

	struct StubExecutor {
		exit_code: i32,
	}

	#[async_trait]
	impl ScriptExecutor for StubExecutor {
		async fn dispatch(
			&self,
			_workflow: &Workflow,
			targets: &[Agent],
		) -> Vec<AgentExecutionResult> {
			targets
				.iter()
				.map(|a| AgentExecutionResult {
					agent_name: a.agent_name.clone(),
					exit_code: self.exit_code,
					error: None,
				})
				.collect()
		}
	}

	fn service(exit_code: i32) -> (WorkflowService, Stores) {
		let stores = Stores::in_memory();
		let notifier = Arc::new(Notifier::new(Arc::new(LogMailer)));
		let executor = Arc::new(StubExecutor { exit_code });
		(WorkflowService::new(stores.clone(), executor, notifier), stores)
	}

	async fn register_agent(stores: &Stores, name: &str) {
		use controller_store::agents::AgentRepository;
		stores
			.agents
			.register(Agent {
				agent_name: name.to_string(),
				host: "10.0.0.5".to_string(),
				port: 7500,
				tls_enabled: false,
				environment: Environment::Dev,
				status: AgentStatus::Online,
				last_heartbeat: None,
			})
			.await
			.unwrap();
	}

	fn create_req() -> CreateWorkflowRequest {
		CreateWorkflowRequest {
			script_id: "disk_check".to_string(),
			targets: vec!["A1".to_string()],
			requestor: "alice".to_string(),
			requestor_email: Some("alice@example.com".to_string()),
			reason: "routine".to_string(),
			required_approval_levels: 1,
			notify_email: Some("approver@example.com".to_string()),
			ttl_minutes: 60,
			script_params: serde_json::Map::new(),
		}
	}

	#[tokio::test]
	async fn happy_path_reaches_executed() {
		let (service, stores) = service(0);
		register_agent(&stores, "A1").await;
		let workflow = service.create(create_req()).await.unwrap();
		let status = service.approve(&workflow.workflow_id, "approver1", 1).await.unwrap();
		assert_eq!(status, WorkflowStatus::Approved);
		let outcome = service
			.execute(&workflow.workflow_id, ExecuteOverrides::default(), false)
			.await
			.unwrap();
		assert_eq!(outcome.workflow.status, WorkflowStatus::Executed);
		let audit = service.audit_log(&workflow.workflow_id).await;
		assert_eq!(audit.len(), 3);
	}

	#[tokio::test]
	async fn execute_before_approval_is_rejected() {
		let (service, stores) = service(0);
		register_agent(&stores, "A1").await;
		let workflow = service.create(create_req()).await.unwrap();
		let err = service
			.execute(&workflow.workflow_id, ExecuteOverrides::default(), false)
			.await
			.unwrap_err();
		assert!(err.to_string().contains("not approved"));
	}

	#[tokio::test]
	async fn reexec_token_bypasses_one_shot_guard() {
		let (service, stores) = service(0);
		register_agent(&stores, "A1").await;
		let workflow = service.create(create_req()).await.unwrap();
		service.approve(&workflow.workflow_id, "approver1", 1).await.unwrap();
		service
			.execute(&workflow.workflow_id, ExecuteOverrides::default(), false)
			.await
			.unwrap();

		// A plain re-execute attempt on an already-executed workflow fails.
		assert!(
			service
				.execute(&workflow.workflow_id, ExecuteOverrides::default(), false)
				.await
				.is_err()
		);

		// But one carrying an already-consumed re-execution token succeeds.
		let outcome = service
			.execute(&workflow.workflow_id, ExecuteOverrides::default(), true)
			.await
			.unwrap();
		assert_eq!(outcome.workflow.status, WorkflowStatus::Executed);
	}
}
