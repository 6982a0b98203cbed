//! The six notification trigger points from §4.5, modeled as a closed enum
//! per §9's redesign note rather than a generic template-and-context blob.

/// Exit status for one agent a workflow executed against, carried by
/// [`NotificationEvent::WorkflowExecuted`].
#[derive(Clone, Debug)]
pub struct AgentExitCode {
	pub agent_name: String,
	pub exit_code: i32,
}

#[derive(Clone, Debug)]
pub enum NotificationEvent {
	WorkflowCreated {
		workflow_id: String,
		approver_email: String,
		requestor: String,
		script_id: String,
		targets: Vec<String>,
	},
	WorkflowApproved {
		workflow_id: String,
		requestor_email: String,
		approved_by: String,
	},
	WorkflowDenied {
		workflow_id: String,
		requestor_email: String,
		denied_by: String,
		reason: Option<String>,
	},
	WorkflowExecuted {
		workflow_id: String,
		requestor_email: String,
		results: Vec<AgentExitCode>,
	},
	ReexecRequested {
		workflow_id: String,
		approver_email: String,
		requester: String,
		note: Option<String>,
	},
	ReexecApproved {
		workflow_id: String,
		requestor_email: String,
		token: String,
	},
}

impl NotificationEvent {
	/// The recipient address for this event. Rendering of the body is out of
	/// scope (§1 Non-goals); only the event, recipient, and required fields
	/// are specified here.
	pub fn recipient(&self) -> &str {
		match self {
			NotificationEvent::WorkflowCreated { approver_email, .. } => approver_email,
			NotificationEvent::WorkflowApproved { requestor_email, .. } => requestor_email,
			NotificationEvent::WorkflowDenied { requestor_email, .. } => requestor_email,
			NotificationEvent::WorkflowExecuted { requestor_email, .. } => requestor_email,
			NotificationEvent::ReexecRequested { approver_email, .. } => approver_email,
			NotificationEvent::ReexecApproved { requestor_email, .. } => requestor_email,
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			NotificationEvent::WorkflowCreated { .. } => "workflow.created",
			NotificationEvent::WorkflowApproved { .. } => "workflow.approved",
			NotificationEvent::WorkflowDenied { .. } => "workflow.denied",
			NotificationEvent::WorkflowExecuted { .. } => "workflow.executed",
			NotificationEvent::ReexecRequested { .. } => "reexec.requested",
			NotificationEvent::ReexecApproved { .. } => "reexec.approved",
		}
	}

	pub fn subject(&self) -> String {
		match self {
			NotificationEvent::WorkflowCreated { workflow_id, .. } => {
				format!("Workflow {workflow_id} awaiting approval")
			},
			NotificationEvent::WorkflowApproved { workflow_id, .. } => format!("Workflow {workflow_id} approved"),
			NotificationEvent::WorkflowDenied { workflow_id, .. } => format!("Workflow {workflow_id} denied"),
			NotificationEvent::WorkflowExecuted { workflow_id, .. } => format!("Workflow {workflow_id} executed"),
			NotificationEvent::ReexecRequested { workflow_id, .. } => {
				format!("Re-execution requested for workflow {workflow_id}")
			},
			NotificationEvent::ReexecApproved { workflow_id, .. } => {
				format!("Re-execution approved for workflow {workflow_id}")
			},
		}
	}

	pub fn body(&self) -> String {
		match self {
			NotificationEvent::WorkflowCreated {
				requestor,
				script_id,
				targets,
				..
			} => format!("{requestor} requested to run {script_id} against {}", targets.join(", ")),
			NotificationEvent::WorkflowApproved { approved_by, .. } => format!("Approved by {approved_by}"),
			NotificationEvent::WorkflowDenied { denied_by, reason, .. } => match reason {
				Some(r) => format!("Denied by {denied_by}: {r}"),
				None => format!("Denied by {denied_by}"),
			},
			NotificationEvent::WorkflowExecuted { results, .. } => results
				.iter()
				.map(|r| format!("{}: exit {}", r.agent_name, r.exit_code))
				.collect::<Vec<_>>()
				.join("\n"),
			NotificationEvent::ReexecRequested { requester, note, .. } => match note {
				Some(n) => format!("{requester} requested re-execution: {n}"),
				None => format!("{requester} requested re-execution"),
			},
			NotificationEvent::ReexecApproved { token, .. } => format!("Re-execution token: {token}"),
		}
	}
}
