use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::models::{ReportRun, ReportRunStatus, ReportScript};

#[async_trait]
pub trait ReportScriptRepository: Send + Sync {
	async fn register(&self, script: ReportScript) -> ReportScript;
	async fn get(&self, script_id: &str) -> Result<ReportScript, StoreError>;
	async fn list(&self) -> Vec<ReportScript>;
	async fn deregister(&self, script_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ReportRunRepository: Send + Sync {
	async fn create(&self, run: ReportRun) -> ReportRun;
	async fn get(&self, run_id: &str) -> Result<ReportRun, StoreError>;
	async fn list_history(&self, limit: Option<usize>) -> Vec<ReportRun>;
	async fn set_terminal(
		&self,
		run_id: &str,
		status: ReportRunStatus,
		exit_code: Option<i32>,
	) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct InMemoryReportScriptRepository {
	scripts: RwLock<HashMap<String, ReportScript>>,
}

impl InMemoryReportScriptRepository {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl ReportScriptRepository for InMemoryReportScriptRepository {
	async fn register(&self, script: ReportScript) -> ReportScript {
		self.scripts.write().insert(script.script_id.clone(), script.clone());
		script
	}

	async fn get(&self, script_id: &str) -> Result<ReportScript, StoreError> {
		self
			.scripts
			.read()
			.get(script_id)
			.cloned()
			.ok_or_else(|| StoreError::NotFound(format!("Report script '{script_id}' not found")))
	}

	async fn list(&self) -> Vec<ReportScript> {
		let mut rows: Vec<ReportScript> = self.scripts.read().values().cloned().collect();
		rows.sort_by(|a, b| a.script_id.cmp(&b.script_id));
		rows
	}

	async fn deregister(&self, script_id: &str) -> Result<(), StoreError> {
		self
			.scripts
			.write()
			.remove(script_id)
			.map(|_| ())
			.ok_or_else(|| StoreError::NotFound(format!("Report script '{script_id}' not found")))
	}
}

#[derive(Default)]
pub struct InMemoryReportRunRepository {
	runs: RwLock<HashMap<String, ReportRun>>,
}

impl InMemoryReportRunRepository {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl ReportRunRepository for InMemoryReportRunRepository {
	async fn create(&self, run: ReportRun) -> ReportRun {
		self.runs.write().insert(run.run_id.clone(), run.clone());
		run
	}

	async fn get(&self, run_id: &str) -> Result<ReportRun, StoreError> {
		self
			.runs
			.read()
			.get(run_id)
			.cloned()
			.ok_or_else(|| StoreError::NotFound(format!("Report run '{run_id}' not found")))
	}

	async fn list_history(&self, limit: Option<usize>) -> Vec<ReportRun> {
		let mut rows: Vec<ReportRun> = self.runs.read().values().cloned().collect();
		rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
		if let Some(limit) = limit {
			rows.truncate(limit);
		}
		rows
	}

	async fn set_terminal(
		&self,
		run_id: &str,
		status: ReportRunStatus,
		exit_code: Option<i32>,
	) -> Result<(), StoreError> {
		let mut runs = self.runs.write();
		let run = runs
			.get_mut(run_id)
			.ok_or_else(|| StoreError::NotFound(format!("Report run '{run_id}' not found")))?;
		run.status = status;
		run.exit_code = exit_code;
		run.completed_at = Some(chrono::Utc::now());
		Ok(())
	}
}
