use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use controller_store::Stores;
use controller_store::agents::AgentFilter;
use controller_store::models::{Agent, AgentStatus, Environment};

use crate::acl::AllowedEnvironments;
use crate::error::RegistryError;
use crate::ping::{PingResult, ping_agent};

/// Request shape for `POST /agents`/`PUT /agents/{name}/status` (§6).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AgentUpdate {
	pub status: Option<AgentStatus>,
	pub tls_enabled: Option<bool>,
	pub environment: Option<Environment>,
}

pub const AGENT_NAME_PATTERN_HINT: &str = "agent_name must match ^[A-Za-z0-9_-]+$ and be 2..255 characters";

/// `agent_name` validation from §8's boundary behaviors.
pub fn validate_agent_name(name: &str) -> Result<(), RegistryError> {
	let len_ok = (2..=255).contains(&name.chars().count());
	let charset_ok = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
	if len_ok && charset_ok {
		Ok(())
	} else {
		Err(RegistryError::Validation(AGENT_NAME_PATTERN_HINT.to_string()))
	}
}

/// `port` validation from §8's boundary behaviors.
pub fn validate_port(port: i64) -> Result<u16, RegistryError> {
	if (1..=65535).contains(&port) {
		Ok(port as u16)
	} else {
		Err(RegistryError::Validation("port must be between 1 and 65535".to_string()))
	}
}

/// `limit` clamping from §8's boundary behaviors: outside [1, 1000] is a
/// validation error, not a silent clamp.
pub fn validate_limit(limit: Option<i64>) -> Result<Option<usize>, RegistryError> {
	match limit {
		None => Ok(None),
		Some(l) if (1..=1000).contains(&l) => Ok(Some(l as usize)),
		Some(_) => Err(RegistryError::Validation("limit must be between 1 and 1000".to_string())),
	}
}

pub struct AgentRegistry {
	stores: Stores,
	stale_after: Duration,
}

impl AgentRegistry {
	pub fn new(stores: Stores, stale_after: Duration) -> Self {
		Self { stores, stale_after }
	}

	pub fn stale_after(&self) -> Duration {
		self.stale_after
	}

	fn require_access(&self, allowed: &AllowedEnvironments, env: Environment) -> Result<(), RegistryError> {
		if allowed.contains(env) {
			Ok(())
		} else {
			Err(RegistryError::EnvironmentForbidden(env.to_string()))
		}
	}

	pub async fn register(&self, agent: Agent, allowed: &AllowedEnvironments) -> Result<Agent, RegistryError> {
		validate_agent_name(&agent.agent_name)?;
		self.require_access(allowed, agent.environment)?;
		Ok(self.stores.agents.register(agent).await?)
	}

	pub async fn heartbeat(&self, name: &str) -> Result<(), RegistryError> {
		Ok(self.stores.agents.update_heartbeat(name).await?)
	}

	/// `list(filter)` from §4.4: `environment` in the filter, if present,
	/// must itself be within the caller's grants (§8 scenario 3); absent,
	/// the caller's full allow-list is applied (wildcard ⇒ unfiltered).
	pub async fn list(
		&self,
		requested_env: Option<Environment>,
		status: Option<AgentStatus>,
		limit: Option<usize>,
		allowed: &AllowedEnvironments,
	) -> Result<Vec<Agent>, RegistryError> {
		let environments = if let Some(env) = requested_env {
			self.require_access(allowed, env)?;
			Some(vec![env])
		} else {
			allowed.as_filter()
		};
		Ok(
			self
				.stores
				.agents
				.list(AgentFilter {
					environments,
					status,
					limit,
				})
				.await,
		)
	}

	/// `/agents/all`: unfiltered by environment, for the reports UI (§6).
	pub async fn list_all(&self, status: Option<AgentStatus>, limit: Option<usize>) -> Vec<Agent> {
		self
			.stores
			.agents
			.list(AgentFilter {
				environments: None,
				status,
				limit,
			})
			.await
	}

	pub async fn get(&self, name: &str, allowed: &AllowedEnvironments) -> Result<Agent, RegistryError> {
		let agent = self.stores.agents.get(name).await?;
		self.require_access(allowed, agent.environment)?;
		Ok(agent)
	}

	pub async fn ping(&self, name: &str, allowed: &AllowedEnvironments) -> Result<PingResult, RegistryError> {
		let agent = self.get(name, allowed).await?;
		Ok(ping_agent(&agent).await)
	}

	/// Environment change requires access to *both* the current and the
	/// target environment (§4.4).
	pub async fn update(
		&self,
		name: &str,
		update: AgentUpdate,
		allowed: &AllowedEnvironments,
	) -> Result<Agent, RegistryError> {
		let current = self.stores.agents.get(name).await?;
		self.require_access(allowed, current.environment)?;
		if let Some(target_env) = update.environment {
			self.require_access(allowed, target_env)?;
		}
		Ok(
			self
				.stores
				.agents
				.update(name, update.status, update.tls_enabled, update.environment)
				.await?,
		)
	}

	pub async fn deregister(&self, name: &str, allowed: &AllowedEnvironments) -> Result<(), RegistryError> {
		let agent = self.stores.agents.get(name).await?;
		self.require_access(allowed, agent.environment)?;
		Ok(self.stores.agents.deregister(name).await?)
	}

	/// Derives observable status from the heartbeat age (§4.4): `online` if
	/// `last_heartbeat` is within `stale_s`, else `offline`. Ignores the
	/// `maintenance` status, which is set explicitly via `update` and is
	/// never inferred from heartbeats.
	pub fn derive_status(&self, agent: &Agent) -> AgentStatus {
		if agent.status == AgentStatus::Maintenance {
			return AgentStatus::Maintenance;
		}
		match agent.last_heartbeat {
			Some(ts) if Utc::now().signed_duration_since(ts).to_std().unwrap_or(Duration::MAX) <= self.stale_after => {
				AgentStatus::Online
			},
			_ => AgentStatus::Offline,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use controller_store::agents::AgentRepository;

	fn agent(name: &str, env: Environment) -> Agent {
		Agent {
			agent_name: name.to_string(),
			host: "10.0.0.5".to_string(),
			port: 7500,
			tls_enabled: false,
			environment: env,
			status: AgentStatus::Online,
			last_heartbeat: None,
		}
	}

	#[tokio::test]
	async fn register_requires_env_access() {
		let registry = AgentRegistry::new(Stores::in_memory(), Duration::from_secs(60));
		let allowed = AllowedEnvironments::Explicit(vec![Environment::Dev]);
		let err = registry
			.register(agent("a1", Environment::Prod), &allowed)
			.await
			.unwrap_err();
		assert!(matches!(err, RegistryError::EnvironmentForbidden(_)));
	}

	#[tokio::test]
	async fn list_with_no_grants_returns_nothing() {
		let stores = Stores::in_memory();
		stores.agents.register(agent("a1", Environment::Dev)).await.unwrap();
		let registry = AgentRegistry::new(stores, Duration::from_secs(60));
		let allowed = AllowedEnvironments::Explicit(vec![]);
		let rows = registry.list(None, None, None, &allowed).await.unwrap();
		assert!(rows.is_empty());
	}

	#[tokio::test]
	async fn list_requested_env_outside_grants_is_forbidden() {
		let registry = AgentRegistry::new(Stores::in_memory(), Duration::from_secs(60));
		let allowed = AllowedEnvironments::Explicit(vec![Environment::Dev]);
		let err = registry
			.list(Some(Environment::Prod), None, None, &allowed)
			.await
			.unwrap_err();
		assert_eq!(err.to_string(), "You don't have access to the PROD environment");
	}

	#[test]
	fn agent_name_rejects_bad_characters() {
		assert!(validate_agent_name("a").is_err());
		assert!(validate_agent_name("valid-name_1").is_ok());
		assert!(validate_agent_name("bad name!").is_err());
	}

	#[test]
	fn limit_outside_bounds_is_rejected() {
		assert!(validate_limit(Some(0)).is_err());
		assert!(validate_limit(Some(1001)).is_err());
		assert_eq!(validate_limit(Some(50)).unwrap(), Some(50));
	}
}
