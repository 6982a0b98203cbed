//! The report dispatcher (§4.6): registers read-only scripts, runs them
//! against a single online agent, and streams output to any number of
//! subscribers attached by `run_id`.
//!
//! Per-run state is owned by this struct rather than scattered across
//! request handlers (§9 redesign note on "per-run in-memory mutable maps for
//! subscribers"): a `parking_lot::Mutex`-guarded [`RunState`] bundles the
//! replay buffer and the `tokio::sync::broadcast` sender so a subscriber's
//! snapshot-then-subscribe is one atomic step, and a late subscriber can
//! never miss or duplicate a frame relative to the snapshot it read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::broadcast;

use controller_store::Stores;
use controller_store::agents::AgentRepository;
use controller_store::models::{AgentStatus, ReportRun, ReportRunStatus, ReportScript};

use crate::error::ReportError;
use crate::executor::{ExecuteError, ReportExecutor};
use crate::frame::StreamFrame;
use crate::id::new_run_id;
use crate::schema::{merge_defaults, validate_parameters};

/// `POST /reports/run/{script_id}` request shape (§4.6).
#[derive(Clone, Debug, Deserialize)]
pub struct RunRequest {
	pub target: String,
	pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// How long a terminal run's in-memory state is kept around for late
/// subscribers before being evicted (§4.6 step 5).
const RETENTION_AFTER_TERMINAL: Duration = Duration::from_secs(60);

/// Channel capacity per run; generously sized relative to a typical script's
/// line count so a live subscriber never lags behind the replay buffer.
const BROADCAST_CAPACITY: usize = 1024;

struct RunState {
	output: Vec<StreamFrame>,
	tx: broadcast::Sender<StreamFrame>,
	terminal: bool,
}

impl RunState {
	fn new() -> Self {
		let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
		Self {
			output: Vec::new(),
			tx,
			terminal: false,
		}
	}

	/// Appends and broadcasts a frame under the same lock, so a subscriber
	/// that snapshots `output` and calls `tx.subscribe()` while holding the
	/// lock can never miss or double-receive it.
	fn push(&mut self, frame: StreamFrame) {
		if matches!(frame, StreamFrame::Complete { .. }) {
			self.terminal = true;
		}
		self.output.push(frame.clone());
		let _ = self.tx.send(frame);
	}
}

pub struct ReportDispatcher {
	stores: Stores,
	executor: Arc<dyn ReportExecutor>,
	runs: Arc<Mutex<HashMap<String, Arc<Mutex<RunState>>>>>,
}

impl ReportDispatcher {
	pub fn new(stores: Stores, executor: Arc<dyn ReportExecutor>) -> Self {
		Self {
			stores,
			executor,
			runs: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	// -- script registry (admin) --------------------------------------------

	pub async fn register_script(&self, script: ReportScript) -> ReportScript {
		self.stores.report_scripts.register(script).await
	}

	pub async fn get_script(&self, script_id: &str) -> Result<ReportScript, ReportError> {
		Ok(self.stores.report_scripts.get(script_id).await?)
	}

	pub async fn list_scripts(&self) -> Vec<ReportScript> {
		self.stores.report_scripts.list().await
	}

	pub async fn deregister_script(&self, script_id: &str) -> Result<(), ReportError> {
		Ok(self.stores.report_scripts.deregister(script_id).await?)
	}

	// -- run life cycle (§4.6 steps 1-5) -------------------------------------

	pub async fn run(&self, script_id: &str, req: RunRequest, run_by: &str) -> Result<ReportRun, ReportError> {
		let script = self.stores.report_scripts.get(script_id).await?;
		validate_parameters(&script, &req.parameters)?;
		let merged = merge_defaults(&script, &req.parameters);

		let agent = self.stores.agents.get(&req.target).await?;
		if agent.status != AgentStatus::Online {
			return Err(ReportError::AgentOffline(agent.agent_name));
		}

		let run = ReportRun {
			run_id: new_run_id(),
			script_id: script.script_id.clone(),
			target_agent: agent.agent_name.clone(),
			parameters: merged.clone(),
			status: ReportRunStatus::Running,
			started_at: Utc::now(),
			completed_at: None,
			exit_code: None,
			run_by: run_by.to_string(),
		};
		let created = self.stores.report_runs.create(run).await;
		self
			.runs
			.lock()
			.insert(created.run_id.clone(), Arc::new(Mutex::new(RunState::new())));

		let run_id = created.run_id.clone();
		let script_path = script.script_path.clone();
		let timeout_s = script.timeout_s;
		let stores = self.stores.clone();
		let executor = self.executor.clone();
		let runs = self.runs.clone();

		tokio::spawn(async move {
			let outcome = executor.execute(&agent, &script_path, timeout_s, &merged).await;
			let (status, exit_code, output_frames) = match outcome {
				Ok(result) => {
					let mut frames = vec![StreamFrame::Output { data: result.stdout }];
					if !result.stderr.is_empty() {
						frames.push(StreamFrame::Output {
							data: format!("\n[STDERR]\n{}", result.stderr),
						});
					}
					let status = if result.exit_code == 0 {
						ReportRunStatus::Completed
					} else {
						ReportRunStatus::Failed
					};
					(status, Some(result.exit_code), frames)
				},
				Err(ExecuteError::Timeout) => (ReportRunStatus::Timeout, Some(-1), Vec::new()),
				Err(ExecuteError::Unreachable(_)) => (ReportRunStatus::Failed, Some(-1), Vec::new()),
			};

			if let Some(state) = runs.lock().get(&run_id).cloned() {
				let mut state = state.lock();
				for frame in output_frames {
					state.push(frame);
				}
				state.push(StreamFrame::Complete { status, exit_code });
			}
			let _ = stores.report_runs.set_terminal(&run_id, status, exit_code).await;
			schedule_eviction(runs, run_id);
		});

		Ok(created)
	}

	/// Attaches a subscriber to `run_id`: returns the full prior output
	/// buffer plus a live receiver for frames broadcast afterward (§4.6
	/// "Stream subscription"). Falls back to the persisted [`ReportRun`] for
	/// a run whose in-memory state has already been evicted (§4.6 step 5).
	pub async fn subscribe(&self, run_id: &str) -> Result<(Vec<StreamFrame>, broadcast::Receiver<StreamFrame>), ReportError> {
		if let Some(state) = self.runs.lock().get(run_id).cloned() {
			let state = state.lock();
			return Ok((state.output.clone(), state.tx.subscribe()));
		}

		let run = self.stores.report_runs.get(run_id).await?;
		let (tx, rx) = broadcast::channel(1);
		let frame = StreamFrame::Complete {
			status: run.status,
			exit_code: run.exit_code,
		};
		drop(tx);
		Ok((vec![frame], rx))
	}

	pub async fn get(&self, run_id: &str) -> Result<ReportRun, ReportError> {
		Ok(self.stores.report_runs.get(run_id).await?)
	}

	pub async fn history(&self, limit: Option<usize>) -> Vec<ReportRun> {
		self.stores.report_runs.list_history(limit).await
	}

	/// `DELETE /reports/result/{run_id}` (§4.6 "Cancellation"): best-effort —
	/// in-flight agent calls are not forcibly aborted, only the observable
	/// run status and stream are finalized.
	pub async fn cancel(&self, run_id: &str) -> Result<(), ReportError> {
		let state = self
			.runs
			.lock()
			.get(run_id)
			.cloned()
			.ok_or_else(|| ReportError::Validation(format!("run '{run_id}' has no active stream to cancel")))?;
		{
			let mut state = state.lock();
			if state.terminal {
				return Ok(());
			}
			state.push(StreamFrame::Complete {
				status: ReportRunStatus::Cancelled,
				exit_code: None,
			});
		}
		self
			.stores
			.report_runs
			.set_terminal(run_id, ReportRunStatus::Cancelled, None)
			.await?;
		schedule_eviction(self.runs.clone(), run_id.to_string());
		Ok(())
	}
}

fn schedule_eviction(runs: Arc<Mutex<HashMap<String, Arc<Mutex<RunState>>>>>, run_id: String) {
	tokio::spawn(async move {
		tokio::time::sleep(RETENTION_AFTER_TERMINAL).await;
		runs.lock().remove(&run_id);
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use controller_store::models::{Agent, Environment, ParameterType, ReportParameter};

	struct StubExecutor {
		exit_code: i32,
	}

	#[async_trait]
	impl ReportExecutor for StubExecutor {
		async fn execute(
			&self,
			_agent: &Agent,
			_command: &str,
			_timeout_s: u64,
			_params: &serde_json::Map<String, serde_json::Value>,
		) -> Result<crate::executor::AgentExecuteResponse, ExecuteError> {
			Ok(crate::executor::AgentExecuteResponse {
				stdout: "ok\n".to_string(),
				stderr: String::new(),
				exit_code: self.exit_code,
			})
		}
	}

	fn dispatcher(exit_code: i32) -> (ReportDispatcher, Stores) {
		let stores = Stores::in_memory();
		let executor = Arc::new(StubExecutor { exit_code });
		(ReportDispatcher::new(stores.clone(), executor), stores)
	}

	async fn seed(stores: &Stores) {
		stores
			.agents
			.register(Agent {
				agent_name: "A1".to_string(),
				host: "10.0.0.5".to_string(),
				port: 7500,
				tls_enabled: false,
				environment: Environment::Dev,
				status: AgentStatus::Online,
				last_heartbeat: None,
			})
			.await
			.unwrap();
		stores
			.report_scripts
			.register(ReportScript {
				script_id: "disk_usage".to_string(),
				name: "Disk usage".to_string(),
				script_path: "/opt/scripts/disk_usage.sh".to_string(),
				category: None,
				description: None,
				timeout_s: 30,
				parameters: vec![ReportParameter {
					name: "path".to_string(),
					label: None,
					param_type: ParameterType::Text,
					required: true,
					default: None,
					options: None,
					min: None,
					max: None,
				}],
			})
			.await;
	}

	fn run_req() -> RunRequest {
		let mut params = serde_json::Map::new();
		params.insert("path".to_string(), serde_json::json!("/var"));
		RunRequest {
			target: "A1".to_string(),
			parameters: params,
		}
	}

	#[tokio::test]
	async fn run_completes_and_broadcasts_terminal_frame() {
		let (dispatcher, stores) = dispatcher(0);
		seed(&stores).await;
		let run = dispatcher.run("disk_usage", run_req(), "alice").await.unwrap();
		let (_, mut rx) = dispatcher.subscribe(&run.run_id).await.unwrap();
		let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
			.await
			.unwrap()
			.unwrap();
		assert!(matches!(frame, StreamFrame::Output { .. }));
		let terminal = tokio::time::timeout(Duration::from_secs(1), rx.recv())
			.await
			.unwrap()
			.unwrap();
		assert!(matches!(
			terminal,
			StreamFrame::Complete {
				status: ReportRunStatus::Completed,
				exit_code: Some(0)
			}
		));
	}

	#[tokio::test]
	async fn missing_required_parameter_is_rejected_before_dispatch() {
		let (dispatcher, stores) = dispatcher(0);
		seed(&stores).await;
		let err = dispatcher
			.run("disk_usage", RunRequest {
				target: "A1".to_string(),
				parameters: serde_json::Map::new(),
			}, "alice")
			.await
			.unwrap_err();
		assert!(matches!(err, ReportError::Validation(_)));
	}

	#[tokio::test]
	async fn offline_target_agent_is_rejected() {
		let (dispatcher, stores) = dispatcher(0);
		seed(&stores).await;
		stores
			.agents
			.update("A1", Some(AgentStatus::Offline), None, None)
			.await
			.unwrap();
		let err = dispatcher.run("disk_usage", run_req(), "alice").await.unwrap_err();
		assert!(matches!(err, ReportError::AgentOffline(_)));
	}

	#[tokio::test]
	async fn late_subscriber_gets_replay_then_terminal_frame() {
		let (dispatcher, stores) = dispatcher(0);
		seed(&stores).await;
		let run = dispatcher.run("disk_usage", run_req(), "alice").await.unwrap();
		// Let the spawned dispatch complete before subscribing.
		tokio::time::sleep(Duration::from_millis(50)).await;
		let (replay, mut rx) = dispatcher.subscribe(&run.run_id).await.unwrap();
		assert!(!replay.is_empty());
		assert!(matches!(replay.last().unwrap(), StreamFrame::Complete { .. }));
		assert!(tokio::time::timeout(Duration::from_millis(50), rx.recv()).await.is_err());
	}

	#[tokio::test]
	async fn cancel_before_completion_marks_cancelled() {
		let (dispatcher, stores) = dispatcher(0);
		seed(&stores).await;
		// Use a script with a long-running stub by registering a run state
		// directly without the spawn racing us: call run() then immediately
		// cancel before the (fast) stub executor finishes.
		let run = dispatcher.run("disk_usage", run_req(), "alice").await.unwrap();
		let _ = dispatcher.cancel(&run.run_id).await;
		let stored = dispatcher.get(&run.run_id).await.unwrap();
		// Whichever of {cancel, stub completion} wins the race, the run ends
		// in exactly one terminal state.
		assert!(stored.status.is_terminal());
	}
}
