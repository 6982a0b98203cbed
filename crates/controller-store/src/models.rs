//! Persisted row shapes for the controller (§3). These are
//! plain data — the repository traits in sibling modules describe how they
//! are created, read, and mutated; the transition *rules* for `Workflow`
//! live in `controller-workflow`, which treats this crate's `Workflow` as
//! the row it persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use controller_auth::Role;

/// One of the three deployment buckets an [`Agent`] lives in and a user may
/// be granted access to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Environment {
	Dev,
	Test,
	Prod,
}

impl Environment {
	pub const ALL: [Environment; 3] = [Environment::Dev, Environment::Test, Environment::Prod];

	pub fn as_str(&self) -> &'static str {
		match self {
			Environment::Dev => "DEV",
			Environment::Test => "TEST",
			Environment::Prod => "PROD",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s.to_ascii_uppercase().as_str() {
			"DEV" => Some(Environment::Dev),
			"TEST" => Some(Environment::Test),
			"PROD" => Some(Environment::Prod),
			_ => None,
		}
	}
}

impl std::fmt::Display for Environment {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A grant row in `user_agent_access`: either a specific environment or the
/// `*` wildcard, which subsumes every specific environment (§3 invariants).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvGrant {
	Environment(Environment),
	Wildcard,
}

impl EnvGrant {
	pub fn parse(s: &str) -> Option<Self> {
		if s == "*" {
			Some(EnvGrant::Wildcard)
		} else {
			Environment::parse(s).map(EnvGrant::Environment)
		}
	}

	pub fn as_str(&self) -> &str {
		match self {
			EnvGrant::Environment(e) => e.as_str(),
			EnvGrant::Wildcard => "*",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
	Online,
	Offline,
	Maintenance,
}

impl AgentStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			AgentStatus::Online => "online",
			AgentStatus::Offline => "offline",
			AgentStatus::Maintenance => "maintenance",
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
	pub agent_name: String,
	pub host: String,
	pub port: u16,
	pub tls_enabled: bool,
	pub environment: Environment,
	pub status: AgentStatus,
	pub last_heartbeat: Option<DateTime<Utc>>,
}

impl Agent {
	/// `http` or `https`, per `tls_enabled` — used to build the base URL the
	/// registry and report dispatcher dial.
	pub fn scheme(&self) -> &'static str {
		if self.tls_enabled { "https" } else { "http" }
	}

	pub fn base_url(&self) -> String {
		format!("{}://{}:{}", self.scheme(), self.host, self.port)
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
	pub user_id: String,
	pub username: String,
	pub role: Role,
	pub email: Option<String>,
	pub full_name: Option<String>,
	pub auth_method: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
	Pending,
	Approved,
	Denied,
	Executing,
	Executed,
	Failed,
	Expired,
}

impl WorkflowStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			WorkflowStatus::Pending => "pending",
			WorkflowStatus::Approved => "approved",
			WorkflowStatus::Denied => "denied",
			WorkflowStatus::Executing => "executing",
			WorkflowStatus::Executed => "executed",
			WorkflowStatus::Failed => "failed",
			WorkflowStatus::Expired => "expired",
		}
	}

	/// Terminal statuses are immutable once reached (§3).
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			WorkflowStatus::Executed | WorkflowStatus::Failed | WorkflowStatus::Denied | WorkflowStatus::Expired
		)
	}
}

impl std::fmt::Display for WorkflowStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Approval {
	pub approver: String,
	pub level: u32,
	pub ts: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workflow {
	pub workflow_id: String,
	pub script_id: String,
	pub targets: Vec<String>,
	pub requestor: String,
	pub requestor_email: Option<String>,
	pub reason: String,
	pub required_approval_levels: u32,
	pub notify_email: Option<String>,
	pub ttl_minutes: i64,
	pub script_params: serde_json::Map<String, serde_json::Value>,
	pub status: WorkflowStatus,
	pub created_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
	pub approvals: Vec<Approval>,
	pub denial_reason: Option<String>,
}

impl Workflow {
	/// The observable status, lazily resolving `pending` workflows whose TTL
	/// has elapsed to `expired` (§3: "may be lazily set").
	pub fn observed_status(&self, now: DateTime<Utc>) -> WorkflowStatus {
		if self.status == WorkflowStatus::Pending && now > self.expires_at {
			WorkflowStatus::Expired
		} else {
			self.status
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
	pub workflow_id: String,
	pub ts: DateTime<Utc>,
	pub action: String,
	pub user: String,
	pub note: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
	Text,
	Number,
	Date,
	Select,
	Checkbox,
	Textarea,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportParameter {
	pub name: String,
	pub label: Option<String>,
	#[serde(rename = "type")]
	pub param_type: ParameterType,
	pub required: bool,
	pub default: Option<serde_json::Value>,
	pub options: Option<Vec<String>>,
	pub min: Option<f64>,
	pub max: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportScript {
	pub script_id: String,
	pub name: String,
	pub script_path: String,
	pub category: Option<String>,
	pub description: Option<String>,
	pub timeout_s: u64,
	pub parameters: Vec<ReportParameter>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportRunStatus {
	Pending,
	Running,
	Completed,
	Failed,
	Timeout,
	Cancelled,
}

impl ReportRunStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			ReportRunStatus::Pending => "pending",
			ReportRunStatus::Running => "running",
			ReportRunStatus::Completed => "completed",
			ReportRunStatus::Failed => "failed",
			ReportRunStatus::Timeout => "timeout",
			ReportRunStatus::Cancelled => "cancelled",
		}
	}

	pub fn is_terminal(&self) -> bool {
		!matches!(self, ReportRunStatus::Pending | ReportRunStatus::Running)
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportRun {
	pub run_id: String,
	pub script_id: String,
	pub target_agent: String,
	pub parameters: serde_json::Map<String, serde_json::Value>,
	pub status: ReportRunStatus,
	pub started_at: DateTime<Utc>,
	pub completed_at: Option<DateTime<Utc>>,
	pub exit_code: Option<i32>,
	pub run_by: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReexecStatus {
	Pending,
	Approved,
	Denied,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReexecRequest {
	pub request_id: String,
	pub workflow_id: String,
	pub requester: String,
	pub requester_email: Option<String>,
	pub note: Option<String>,
	pub status: ReexecStatus,
	pub created_at: DateTime<Utc>,
}
