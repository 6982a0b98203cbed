use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use controller_auth::resolver::{ExecutionTokenDirectory, PrincipalDirectory};
use controller_auth::token::{constant_time_eq, ExecutionToken, TokenRecord};
use controller_auth::{AuthError, Role};

use crate::error::StoreError;
use crate::users::UserRepository;

#[async_trait]
pub trait BearerTokenRepository: Send + Sync {
	async fn issue(&self, token_name: &str, role: Role) -> TokenRecord;
	/// Inserts a token with an operator-chosen value, for the bootstrap
	/// tokens a deployment's `Config` lists at startup (§9 redesign note:
	/// read configuration once, at startup, rather than generating
	/// credentials no operator-supplied secret could ever match).
	async fn seed(&self, value: &str, token_name: &str, role: Role);
	async fn revoke(&self, value: &str) -> Result<(), StoreError>;
	async fn lookup(&self, value: &str) -> Option<TokenRecord>;
}

#[derive(Default)]
pub struct InMemoryBearerTokenRepository {
	tokens: RwLock<HashMap<String, TokenRecord>>,
}

impl InMemoryBearerTokenRepository {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl BearerTokenRepository for InMemoryBearerTokenRepository {
	async fn issue(&self, token_name: &str, role: Role) -> TokenRecord {
		let record = TokenRecord {
			value: controller_auth::token::generate_token_value(),
			role,
			token_name: token_name.to_string(),
			revoked: false,
		};
		self.tokens.write().insert(record.value.clone(), record.clone());
		record
	}

	async fn seed(&self, value: &str, token_name: &str, role: Role) {
		let record = TokenRecord {
			value: value.to_string(),
			role,
			token_name: token_name.to_string(),
			revoked: false,
		};
		self.tokens.write().insert(record.value.clone(), record);
	}

	async fn revoke(&self, value: &str) -> Result<(), StoreError> {
		let mut tokens = self.tokens.write();
		let record = tokens
			.get_mut(value)
			.ok_or_else(|| StoreError::NotFound("token not found".to_string()))?;
		record.revoked = true;
		Ok(())
	}

	async fn lookup(&self, value: &str) -> Option<TokenRecord> {
		// Linear scan with a constant-time comparison, matching §4.3's "in a
		// realistic implementation, lookup is by constant-time comparison to
		// a stored hash" — at controller scale (dozens of tokens) a scan is
		// plenty fast and keeps the timing-safety property explicit.
		self
			.tokens
			.read()
			.values()
			.find(|t| constant_time_eq(&t.value, value))
			.cloned()
	}
}

/// Bridges [`UserRepository`] + [`BearerTokenRepository`] into the single
/// [`PrincipalDirectory`] the auth resolver consults, so the resolver crate
/// stays free of a concrete persistence dependency.
pub struct PrincipalDirectoryImpl {
	users: Arc<dyn UserRepository>,
	tokens: Arc<dyn BearerTokenRepository>,
}

impl PrincipalDirectoryImpl {
	pub fn new(users: Arc<dyn UserRepository>, tokens: Arc<dyn BearerTokenRepository>) -> Self {
		Self { users, tokens }
	}
}

#[async_trait]
impl PrincipalDirectory for PrincipalDirectoryImpl {
	async fn role_for_username(&self, username: &str) -> Option<Role> {
		self.users.get(username).await.map(|u| u.role)
	}

	async fn lookup_bearer_token(&self, value: &str) -> Option<TokenRecord> {
		self.tokens.lookup(value).await
	}
}

#[async_trait]
pub trait ExecutionTokenRepository: Send + Sync {
	async fn issue(&self, workflow_id: &str, ttl: chrono::Duration) -> ExecutionToken;
	async fn get(&self, token_value: &str) -> Option<ExecutionToken>;
}

#[derive(Default)]
pub struct InMemoryExecutionTokenRepository {
	tokens: RwLock<HashMap<String, ExecutionToken>>,
}

impl InMemoryExecutionTokenRepository {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl ExecutionTokenRepository for InMemoryExecutionTokenRepository {
	async fn issue(&self, workflow_id: &str, ttl: chrono::Duration) -> ExecutionToken {
		let token = ExecutionToken::new(workflow_id, ttl);
		self.tokens.write().insert(token.token.clone(), token.clone());
		token
	}

	async fn get(&self, token_value: &str) -> Option<ExecutionToken> {
		self.tokens.read().get(token_value).cloned()
	}
}

#[async_trait]
impl ExecutionTokenDirectory for InMemoryExecutionTokenRepository {
	async fn try_consume(&self, workflow_id: &str, token_value: &str, consumed_by: &str) -> Result<(), AuthError> {
		let mut tokens = self.tokens.write();
		let token = tokens
			.get_mut(token_value)
			.ok_or(AuthError::ExecutionTokenMissing)?;
		if token.workflow_id != workflow_id {
			return Err(AuthError::ExecutionTokenWrongWorkflow(token.workflow_id.clone()));
		}
		if token.used {
			return Err(AuthError::ExecutionTokenUsed);
		}
		if token.is_expired(Utc::now()) {
			return Err(AuthError::ExecutionTokenExpired);
		}
		token.used = true;
		token.used_by = Some(consumed_by.to_string());
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn revoked_bearer_token_is_flagged() {
		let repo = InMemoryBearerTokenRepository::new();
		let record = repo.issue("ci-bot", Role::Admin).await;
		repo.revoke(&record.value).await.unwrap();
		let looked_up = repo.lookup(&record.value).await.unwrap();
		assert!(looked_up.revoked);
	}

	#[tokio::test]
	async fn execution_token_second_consume_fails() {
		let repo = InMemoryExecutionTokenRepository::new();
		let token = repo.issue("wf-1", chrono::Duration::minutes(10)).await;
		repo.try_consume("wf-1", &token.token, "alice").await.unwrap();
		assert!(matches!(
			repo.try_consume("wf-1", &token.token, "alice").await,
			Err(AuthError::ExecutionTokenUsed)
		));
	}

	#[tokio::test]
	async fn execution_token_rejects_wrong_workflow() {
		let repo = InMemoryExecutionTokenRepository::new();
		let token = repo.issue("wf-1", chrono::Duration::minutes(10)).await;
		assert!(matches!(
			repo.try_consume("wf-2", &token.token, "alice").await,
			Err(AuthError::ExecutionTokenWrongWorkflow(_))
		));
	}
}
