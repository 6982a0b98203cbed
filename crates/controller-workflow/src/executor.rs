//! The Script Executor external collaborator (§4.5 step 5): fans out a
//! workflow's execution to each target agent over HTTPS. Script content
//! sandboxing on the agent side is out of scope (§1 Non-goals) — this
//! module only knows how to call the agent's `/execute-workflow` endpoint
//! and interpret its result.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use controller_store::models::{Agent, Workflow};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentExecutionResult {
	pub agent_name: String,
	pub exit_code: i32,
	pub error: Option<String>,
}

#[async_trait]
pub trait ScriptExecutor: Send + Sync {
	/// Dispatches `workflow` to every agent in `targets`, in order, and
	/// returns one result per agent. A transport failure against an
	/// individual agent is captured as a nonzero `exit_code` with `error`
	/// set rather than short-circuiting the remaining targets, since §4.5
	/// only distinguishes "the whole execution raised" from "it returned"
	/// — per-target failures are part of a normal return.
	async fn dispatch(&self, workflow: &Workflow, targets: &[Agent]) -> Vec<AgentExecutionResult>;
}

#[derive(Serialize)]
struct ExecuteWorkflowRequest<'a> {
	workflow_id: &'a str,
	script_id: &'a str,
	script_params: &'a serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct ExecuteWorkflowResponse {
	#[serde(default)]
	exit_code: i32,
}

pub struct HttpScriptExecutor {
	client: reqwest::Client,
}

impl HttpScriptExecutor {
	pub fn new() -> Self {
		Self {
			client: reqwest::Client::builder()
				.timeout(Duration::from_secs(300))
				.build()
				.expect("reqwest client"),
		}
	}
}

impl Default for HttpScriptExecutor {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl ScriptExecutor for HttpScriptExecutor {
	async fn dispatch(&self, workflow: &Workflow, targets: &[Agent]) -> Vec<AgentExecutionResult> {
		let mut results = Vec::with_capacity(targets.len());
		for agent in targets {
			let url = format!("{}/execute-workflow", agent.base_url());
			let body = ExecuteWorkflowRequest {
				workflow_id: &workflow.workflow_id,
				script_id: &workflow.script_id,
				script_params: &workflow.script_params,
			};
			let result = match self.client.post(&url).json(&body).send().await {
				Ok(resp) if resp.status().is_success() => {
					let parsed: ExecuteWorkflowResponse = resp.json().await.unwrap_or_default();
					AgentExecutionResult {
						agent_name: agent.agent_name.clone(),
						exit_code: parsed.exit_code,
						error: None,
					}
				},
				Ok(resp) => AgentExecutionResult {
					agent_name: agent.agent_name.clone(),
					exit_code: -1,
					error: Some(format!("agent returned HTTP {}", resp.status())),
				},
				Err(err) => AgentExecutionResult {
					agent_name: agent.agent_name.clone(),
					exit_code: -1,
					error: Some(err.to_string()),
				},
			};
			results.push(result);
		}
		results
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use controller_store::models::{AgentStatus, Environment};
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn workflow() -> Workflow {
		use chrono::{Duration as ChronoDuration, Utc};
		Workflow {
			workflow_id: "wf1".to_string(),
			script_id: "disk_check".to_string(),
			targets: vec!["A1".to_string()],
			requestor: "alice".to_string(),
			requestor_email: None,
			reason: "routine".to_string(),
			required_approval_levels: 1,
			notify_email: None,
			ttl_minutes: 60,
			script_params: serde_json::Map::new(),
			status: controller_store::models::WorkflowStatus::Executing,
			created_at: Utc::now(),
			expires_at: Utc::now() + ChronoDuration::minutes(60),
			approvals: Vec::new(),
			denial_reason: None,
		}
	}

	#[tokio::test]
	async fn dispatch_reports_exit_code_from_agent() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/execute-workflow"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"exit_code": 0})))
			.mount(&server)
			.await;

		let url = reqwest::Url::parse(&server.uri()).unwrap();
		let agent = Agent {
			agent_name: "A1".to_string(),
			host: url.host_str().unwrap().to_string(),
			port: url.port().unwrap(),
			tls_enabled: false,
			environment: Environment::Dev,
			status: AgentStatus::Online,
			last_heartbeat: None,
		};

		let executor = HttpScriptExecutor::new();
		let results = executor.dispatch(&workflow(), &[agent]).await;
		assert_eq!(results.len(), 1);
		assert_eq!(results[0].exit_code, 0);
		assert!(results[0].error.is_none());
	}

	#[tokio::test]
	async fn dispatch_captures_unreachable_agent_as_failure() {
		let agent = Agent {
			agent_name: "A1".to_string(),
			host: "127.0.0.1".to_string(),
			port: 1,
			tls_enabled: false,
			environment: Environment::Dev,
			status: AgentStatus::Online,
			last_heartbeat: None,
		};
		let executor = HttpScriptExecutor::new();
		let results = executor.dispatch(&workflow(), &[agent]).await;
		assert_eq!(results[0].exit_code, -1);
		assert!(results[0].error.is_some());
	}
}
