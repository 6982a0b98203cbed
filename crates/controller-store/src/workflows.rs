use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::models::{Approval, AuditEntry, Workflow, WorkflowStatus};

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
	async fn create(&self, workflow: Workflow) -> Workflow;

	async fn get(&self, workflow_id: &str) -> Result<Workflow, StoreError>;

	async fn list(&self) -> Vec<Workflow>;

	/// Records one approval at `level` by `approver`. Atomic with the
	/// pending→approved transition: if this approval brings the count to
	/// `required_approval_levels`, the status flips to `approved` in the
	/// same critical section, so two concurrent last-approvals can never
	/// both observe "still pending" (§5, §8 round-trip law).
	async fn record_approval(&self, workflow_id: &str, approver: &str, level: u32) -> Result<WorkflowStatus, StoreError>;

	async fn deny(&self, workflow_id: &str, approver: &str, reason: Option<String>) -> Result<(), StoreError>;

	/// Compare-and-set `approved -> executing`. A second concurrent caller
	/// must fail (§5, §8 round-trip law); the precise rejection reason
	/// mirrors the workflow's current state (already-executed, denied,
	/// expired, or simply not yet approved).
	async fn begin_execute(&self, workflow_id: &str) -> Result<Workflow, StoreError>;

	/// Unconditionally transitions to `executing` regardless of current
	/// status, for the re-execution path (§4.5): the one-shot guarantee for
	/// re-execution is enforced by the single-consumption
	/// `X-Execution-Token`, not by the workflow status machine, so a
	/// workflow that already reached `executed` may be forced back through
	/// `executing` once a valid token has been consumed.
	async fn force_reexecute(&self, workflow_id: &str) -> Result<Workflow, StoreError>;

	async fn finish_execute(&self, workflow_id: &str, succeeded: bool) -> Result<(), StoreError>;

	async fn append_audit(&self, entry: AuditEntry);

	async fn list_audit(&self, workflow_id: &str) -> Vec<AuditEntry>;
}

struct Inner {
	workflows: HashMap<String, Workflow>,
	audit: Vec<AuditEntry>,
}

pub struct InMemoryWorkflowRepository {
	inner: Mutex<Inner>,
}

impl InMemoryWorkflowRepository {
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(Inner {
				workflows: HashMap::new(),
				audit: Vec::new(),
			}),
		}
	}
}

impl Default for InMemoryWorkflowRepository {
	fn default() -> Self {
		Self::new()
	}
}

fn not_approved_detail(w: &Workflow, now: chrono::DateTime<Utc>) -> String {
	match w.observed_status(now) {
		WorkflowStatus::Executed => "Workflow has already been executed".to_string(),
		WorkflowStatus::Expired => "Workflow has expired".to_string(),
		other => format!("Workflow is not approved (status: {other})"),
	}
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
	async fn create(&self, workflow: Workflow) -> Workflow {
		let mut inner = self.inner.lock();
		inner.workflows.insert(workflow.workflow_id.clone(), workflow.clone());
		workflow
	}

	async fn get(&self, workflow_id: &str) -> Result<Workflow, StoreError> {
		self
			.inner
			.lock()
			.workflows
			.get(workflow_id)
			.cloned()
			.ok_or_else(|| StoreError::NotFound(format!("Workflow '{workflow_id}' not found")))
	}

	async fn list(&self) -> Vec<Workflow> {
		let mut rows: Vec<Workflow> = self.inner.lock().workflows.values().cloned().collect();
		rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
		rows
	}

	async fn record_approval(&self, workflow_id: &str, approver: &str, level: u32) -> Result<WorkflowStatus, StoreError> {
		let now = Utc::now();
		let mut inner = self.inner.lock();
		let workflow = inner
			.workflows
			.get_mut(workflow_id)
			.ok_or_else(|| StoreError::NotFound(format!("Workflow '{workflow_id}' not found")))?;

		if workflow.observed_status(now) != WorkflowStatus::Pending {
			return Err(StoreError::Conflict(format!(
				"Workflow is not pending approval (status: {})",
				workflow.observed_status(now)
			)));
		}
		if workflow.approvals.iter().any(|a| a.approver == approver) {
			return Err(StoreError::Conflict("Already approved by this user".to_string()));
		}

		workflow.approvals.push(Approval {
			approver: approver.to_string(),
			level,
			ts: now,
		});
		if workflow.approvals.len() as u32 >= workflow.required_approval_levels {
			workflow.status = WorkflowStatus::Approved;
		}
		Ok(workflow.status)
	}

	async fn deny(&self, workflow_id: &str, _approver: &str, reason: Option<String>) -> Result<(), StoreError> {
		let now = Utc::now();
		let mut inner = self.inner.lock();
		let workflow = inner
			.workflows
			.get_mut(workflow_id)
			.ok_or_else(|| StoreError::NotFound(format!("Workflow '{workflow_id}' not found")))?;
		if workflow.observed_status(now) != WorkflowStatus::Pending {
			return Err(StoreError::Conflict(format!(
				"Workflow is not pending approval (status: {})",
				workflow.observed_status(now)
			)));
		}
		workflow.status = WorkflowStatus::Denied;
		workflow.denial_reason = reason;
		Ok(())
	}

	async fn begin_execute(&self, workflow_id: &str) -> Result<Workflow, StoreError> {
		let now = Utc::now();
		let mut inner = self.inner.lock();
		let workflow = inner
			.workflows
			.get_mut(workflow_id)
			.ok_or_else(|| StoreError::NotFound(format!("Workflow '{workflow_id}' not found")))?;
		if workflow.observed_status(now) != WorkflowStatus::Approved {
			return Err(StoreError::Conflict(not_approved_detail(workflow, now)));
		}
		workflow.status = WorkflowStatus::Executing;
		Ok(workflow.clone())
	}

	async fn force_reexecute(&self, workflow_id: &str) -> Result<Workflow, StoreError> {
		let mut inner = self.inner.lock();
		let workflow = inner
			.workflows
			.get_mut(workflow_id)
			.ok_or_else(|| StoreError::NotFound(format!("Workflow '{workflow_id}' not found")))?;
		workflow.status = WorkflowStatus::Executing;
		Ok(workflow.clone())
	}

	async fn finish_execute(&self, workflow_id: &str, succeeded: bool) -> Result<(), StoreError> {
		let mut inner = self.inner.lock();
		let workflow = inner
			.workflows
			.get_mut(workflow_id)
			.ok_or_else(|| StoreError::NotFound(format!("Workflow '{workflow_id}' not found")))?;
		if workflow.status != WorkflowStatus::Executing {
			return Err(StoreError::Conflict(format!(
				"Workflow is not executing (status: {})",
				workflow.status
			)));
		}
		workflow.status = if succeeded {
			WorkflowStatus::Executed
		} else {
			WorkflowStatus::Failed
		};
		Ok(())
	}

	async fn append_audit(&self, entry: AuditEntry) {
		self.inner.lock().audit.push(entry);
	}

	async fn list_audit(&self, workflow_id: &str) -> Vec<AuditEntry> {
		let mut rows: Vec<AuditEntry> = self
			.inner
			.lock()
			.audit
			.iter()
			.filter(|e| e.workflow_id == workflow_id)
			.cloned()
			.collect();
		rows.sort_by(|a, b| a.ts.cmp(&b.ts));
		rows
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	fn workflow(id: &str, required: u32, ttl_minutes: i64) -> Workflow {
		let now = Utc::now();
		Workflow {
			workflow_id: id.to_string(),
			script_id: "disk_check".to_string(),
			targets: vec!["A1".to_string()],
			requestor: "alice".to_string(),
			requestor_email: None,
			reason: "routine".to_string(),
			required_approval_levels: required,
			notify_email: None,
			ttl_minutes,
			script_params: serde_json::Map::new(),
			status: WorkflowStatus::Pending,
			created_at: now,
			expires_at: now + Duration::minutes(ttl_minutes),
			approvals: Vec::new(),
			denial_reason: None,
		}
	}

	#[tokio::test]
	async fn single_approval_reaching_threshold_transitions_atomically() {
		let repo = InMemoryWorkflowRepository::new();
		repo.create(workflow("wf1", 1, 60)).await;
		let status = repo.record_approval("wf1", "approver1", 1).await.unwrap();
		assert_eq!(status, WorkflowStatus::Approved);
	}

	#[tokio::test]
	async fn duplicate_approver_is_rejected() {
		let repo = InMemoryWorkflowRepository::new();
		repo.create(workflow("wf1", 2, 60)).await;
		repo.record_approval("wf1", "approver1", 1).await.unwrap();
		let err = repo.record_approval("wf1", "approver1", 2).await.unwrap_err();
		assert_eq!(err.to_string(), "Already approved by this user");
	}

	#[tokio::test]
	async fn two_distinct_approvers_reach_approved_with_both_recorded() {
		let repo = InMemoryWorkflowRepository::new();
		repo.create(workflow("wf1", 2, 60)).await;
		repo.record_approval("wf1", "approver1", 1).await.unwrap();
		let status = repo.record_approval("wf1", "approver2", 2).await.unwrap();
		assert_eq!(status, WorkflowStatus::Approved);
		let w = repo.get("wf1").await.unwrap();
		assert_eq!(w.approvals.len(), 2);
	}

	#[tokio::test]
	async fn begin_execute_requires_approved() {
		let repo = InMemoryWorkflowRepository::new();
		repo.create(workflow("wf1", 1, 60)).await;
		let err = repo.begin_execute("wf1").await.unwrap_err();
		assert!(err.to_string().contains("not approved"));
	}

	#[tokio::test]
	async fn begin_execute_is_one_shot_under_concurrency() {
		let repo = std::sync::Arc::new(InMemoryWorkflowRepository::new());
		repo.create(workflow("wf1", 1, 60)).await;
		repo.record_approval("wf1", "approver1", 1).await.unwrap();

		let r1 = repo.clone();
		let r2 = repo.clone();
		let (a, b) = tokio::join!(
			tokio::spawn(async move { r1.begin_execute("wf1").await }),
			tokio::spawn(async move { r2.begin_execute("wf1").await })
		);
		let results = [a.unwrap(), b.unwrap()];
		let ok_count = results.iter().filter(|r| r.is_ok()).count();
		let err_count = results.iter().filter(|r| r.is_err()).count();
		assert_eq!(ok_count, 1);
		assert_eq!(err_count, 1);
	}

	#[tokio::test]
	async fn finish_execute_is_not_reenterable() {
		let repo = InMemoryWorkflowRepository::new();
		repo.create(workflow("wf1", 1, 60)).await;
		repo.record_approval("wf1", "approver1", 1).await.unwrap();
		repo.begin_execute("wf1").await.unwrap();
		repo.finish_execute("wf1", true).await.unwrap();
		assert!(matches!(
			repo.finish_execute("wf1", true).await,
			Err(StoreError::Conflict(_))
		));
		let w = repo.get("wf1").await.unwrap();
		assert_eq!(w.status, WorkflowStatus::Executed);
	}

	#[tokio::test]
	async fn expired_pending_workflow_reports_expired_on_execute() {
		let repo = InMemoryWorkflowRepository::new();
		repo.create(workflow("wf1", 1, -1)).await;
		let err = repo.begin_execute("wf1").await.unwrap_err();
		assert!(err.to_string().contains("expired"));
	}
}
