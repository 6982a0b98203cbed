use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::models::{Agent, AgentStatus, Environment};

/// Optional filters for a [`AgentRepository::list`] call. `environments ==
/// None` means "no environment restriction" (caller holds the `*` grant);
/// `Some(&[])` means "nothing visible".
#[derive(Clone, Debug, Default)]
pub struct AgentFilter {
	pub environments: Option<Vec<Environment>>,
	pub status: Option<AgentStatus>,
	pub limit: Option<usize>,
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
	/// Registers a new agent or upserts an existing one of the same name.
	/// Rejects with [`StoreError::Conflict`] if `(host, port)` is already
	/// bound to a *different* agent name (§3 invariant, §8 scenario 2).
	async fn register(&self, agent: Agent) -> Result<Agent, StoreError>;

	async fn get(&self, name: &str) -> Result<Agent, StoreError>;

	async fn list(&self, filter: AgentFilter) -> Vec<Agent>;

	async fn update_heartbeat(&self, name: &str) -> Result<(), StoreError>;

	async fn update(
		&self,
		name: &str,
		status: Option<AgentStatus>,
		tls_enabled: Option<bool>,
		environment: Option<Environment>,
	) -> Result<Agent, StoreError>;

	async fn deregister(&self, name: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct InMemoryAgentRepository {
	by_name: RwLock<HashMap<String, Agent>>,
}

impl InMemoryAgentRepository {
	pub fn new() -> Self {
		Self::default()
	}

	fn host_port_owner(agents: &HashMap<String, Agent>, host: &str, port: u16, exclude: &str) -> Option<String> {
		agents
			.values()
			.find(|a| a.host == host && a.port == port && a.agent_name != exclude)
			.map(|a| a.agent_name.clone())
	}
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
	async fn register(&self, agent: Agent) -> Result<Agent, StoreError> {
		let mut agents = self.by_name.write();
		if let Some(owner) = Self::host_port_owner(&agents, &agent.host, agent.port, &agent.agent_name) {
			return Err(StoreError::Conflict(format!(
				"Host:port {}:{} already in use by agent '{}'",
				agent.host, agent.port, owner
			)));
		}
		agents.insert(agent.agent_name.clone(), agent.clone());
		Ok(agent)
	}

	async fn get(&self, name: &str) -> Result<Agent, StoreError> {
		self
			.by_name
			.read()
			.get(name)
			.cloned()
			.ok_or_else(|| StoreError::NotFound(format!("Agent '{name}' not found")))
	}

	async fn list(&self, filter: AgentFilter) -> Vec<Agent> {
		let agents = self.by_name.read();
		let mut rows: Vec<Agent> = agents
			.values()
			.filter(|a| match &filter.environments {
				None => true,
				Some(envs) => envs.contains(&a.environment),
			})
			.filter(|a| filter.status.map(|s| s == a.status).unwrap_or(true))
			.cloned()
			.collect();
		rows.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));
		if let Some(limit) = filter.limit {
			rows.truncate(limit);
		}
		rows
	}

	async fn update_heartbeat(&self, name: &str) -> Result<(), StoreError> {
		let mut agents = self.by_name.write();
		let agent = agents
			.get_mut(name)
			.ok_or_else(|| StoreError::NotFound(format!("Agent '{name}' not found")))?;
		agent.last_heartbeat = Some(Utc::now());
		Ok(())
	}

	async fn update(
		&self,
		name: &str,
		status: Option<AgentStatus>,
		tls_enabled: Option<bool>,
		environment: Option<Environment>,
	) -> Result<Agent, StoreError> {
		let mut agents = self.by_name.write();
		let agent = agents
			.get_mut(name)
			.ok_or_else(|| StoreError::NotFound(format!("Agent '{name}' not found")))?;
		if let Some(s) = status {
			agent.status = s;
		}
		if let Some(t) = tls_enabled {
			agent.tls_enabled = t;
		}
		if let Some(e) = environment {
			agent.environment = e;
		}
		Ok(agent.clone())
	}

	async fn deregister(&self, name: &str) -> Result<(), StoreError> {
		let mut agents = self.by_name.write();
		agents
			.remove(name)
			.map(|_| ())
			.ok_or_else(|| StoreError::NotFound(format!("Agent '{name}' not found")))
	}
}
