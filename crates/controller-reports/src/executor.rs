//! The agent-facing half of the report dispatcher (§4.6 step 2): POSTs the
//! registered script to the target agent's `/execute` endpoint and returns
//! its stdout/stderr/exit_code. Mirrors `controller_workflow::executor`'s
//! split between a trait (mockable with `wiremock`) and an `HttpReportExecutor`
//! built on `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use controller_store::models::Agent;

#[derive(Clone, Debug, Default)]
pub struct AgentExecuteResponse {
	pub stdout: String,
	pub stderr: String,
	pub exit_code: i32,
}

#[derive(thiserror::Error, Debug)]
pub enum ExecuteError {
	#[error("agent unreachable: {0}")]
	Unreachable(String),
	#[error("agent timed out")]
	Timeout,
}

#[async_trait]
pub trait ReportExecutor: Send + Sync {
	/// Dispatches `command` with `timeout_s` and `params` (marshalled as the
	/// `REPORT_PARAMS` env entry, §4.6 step 2) against `agent`, with a client
	/// total timeout of `timeout_s + 10` (§4.6 step 2).
	async fn execute(
		&self,
		agent: &Agent,
		command: &str,
		timeout_s: u64,
		params: &serde_json::Map<String, serde_json::Value>,
	) -> Result<AgentExecuteResponse, ExecuteError>;
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
	command: &'a str,
	timeout: u64,
	stream: bool,
	env: ExecuteEnv,
}

#[derive(Serialize)]
struct ExecuteEnv {
	#[serde(rename = "REPORT_PARAMS")]
	report_params: String,
}

#[derive(Deserialize, Default)]
struct ExecuteResponseBody {
	#[serde(default)]
	stdout: String,
	#[serde(default)]
	stderr: String,
	#[serde(default)]
	exit_code: i32,
}

pub struct HttpReportExecutor;

impl HttpReportExecutor {
	pub fn new() -> Self {
		Self
	}
}

impl Default for HttpReportExecutor {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl ReportExecutor for HttpReportExecutor {
	async fn execute(
		&self,
		agent: &Agent,
		command: &str,
		timeout_s: u64,
		params: &serde_json::Map<String, serde_json::Value>,
	) -> Result<AgentExecuteResponse, ExecuteError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(timeout_s + 10))
			.build()
			.map_err(|e| ExecuteError::Unreachable(e.to_string()))?;

		let body = ExecuteRequest {
			command,
			timeout: timeout_s,
			stream: true,
			env: ExecuteEnv {
				report_params: serde_json::Value::Object(params.clone()).to_string(),
			},
		};

		let url = format!("{}/execute", agent.base_url());
		let resp = client.post(&url).json(&body).send().await.map_err(|e| {
			if e.is_timeout() {
				ExecuteError::Timeout
			} else {
				ExecuteError::Unreachable(e.to_string())
			}
		})?;

		if !resp.status().is_success() {
			return Err(ExecuteError::Unreachable(format!("agent returned HTTP {}", resp.status())));
		}

		let parsed: ExecuteResponseBody = resp
			.json()
			.await
			.map_err(|e| ExecuteError::Unreachable(e.to_string()))?;
		Ok(AgentExecuteResponse {
			stdout: parsed.stdout,
			stderr: parsed.stderr,
			exit_code: parsed.exit_code,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use controller_store::models::{AgentStatus, Environment};
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn agent_for(server: &MockServer) -> Agent {
		let url = reqwest::Url::parse(&server.uri()).unwrap();
		Agent {
			agent_name: "A1".to_string(),
			host: url.host_str().unwrap().to_string(),
			port: url.port().unwrap(),
			tls_enabled: false,
			environment: Environment::Dev,
			status: AgentStatus::Online,
			last_heartbeat: None,
		}
	}

	#[tokio::test]
	async fn execute_parses_stdout_stderr_and_exit_code() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/execute"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"stdout": "42G free\n",
				"stderr": "",
				"exit_code": 0,
			})))
			.mount(&server)
			.await;

		let executor = HttpReportExecutor::new();
		let result = executor
			.execute(&agent_for(&server), "disk_usage.sh", 30, &serde_json::Map::new())
			.await
			.unwrap();
		assert_eq!(result.stdout, "42G free\n");
		assert_eq!(result.exit_code, 0);
	}

	#[tokio::test]
	async fn unreachable_agent_is_reported() {
		let agent = Agent {
			agent_name: "A1".to_string(),
			host: "127.0.0.1".to_string(),
			port: 1,
			tls_enabled: false,
			environment: Environment::Dev,
			status: AgentStatus::Online,
			last_heartbeat: None,
		};
		let executor = HttpReportExecutor::new();
		let err = executor
			.execute(&agent, "disk_usage.sh", 1, &serde_json::Map::new())
			.await
			.unwrap_err();
		assert!(matches!(err, ExecuteError::Unreachable(_)));
	}
}
