use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use controller_auth::Role;

use crate::error::StoreError;
use crate::models::{EnvGrant, User};

#[derive(Clone, Debug, Serialize)]
pub struct EnvAccessEntry {
	pub user_id: String,
	pub environment: EnvGrant,
	pub granted_by: String,
	pub granted_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
	/// Returns the existing user, or creates one with `default_role` if this
	/// is the first time `username` has been seen (§3 User lifecycle).
	async fn get_or_create(&self, username: &str, auth_method: &str, default_role: Role) -> User;

	async fn get(&self, username: &str) -> Option<User>;

	async fn set_role(&self, username: &str, role: Role) -> Result<(), StoreError>;

	/// `(user_id, environment)` is unique (§6 persisted schema); re-granting
	/// the same pair is an idempotent no-op.
	async fn grant(&self, user_id: &str, environment: EnvGrant, granted_by: &str) -> Result<(), StoreError>;

	async fn revoke(&self, user_id: &str, environment: EnvGrant) -> Result<(), StoreError>;

	async fn grants_for(&self, user_id: &str) -> Vec<EnvAccessEntry>;

	async fn all_grants(&self) -> Vec<EnvAccessEntry>;
}

#[derive(Default)]
pub struct InMemoryUserRepository {
	users: RwLock<HashMap<String, User>>,
	grants: RwLock<Vec<EnvAccessEntry>>,
}

impl InMemoryUserRepository {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
	async fn get_or_create(&self, username: &str, auth_method: &str, default_role: Role) -> User {
		if let Some(existing) = self.users.read().get(username).cloned() {
			return existing;
		}
		let mut users = self.users.write();
		users
			.entry(username.to_string())
			.or_insert_with(|| User {
				user_id: username.to_string(),
				username: username.to_string(),
				role: default_role,
				email: None,
				full_name: None,
				auth_method: auth_method.to_string(),
			})
			.clone()
	}

	async fn get(&self, username: &str) -> Option<User> {
		self.users.read().get(username).cloned()
	}

	async fn set_role(&self, username: &str, role: Role) -> Result<(), StoreError> {
		let mut users = self.users.write();
		let user = users
			.get_mut(username)
			.ok_or_else(|| StoreError::NotFound(format!("User '{username}' not found")))?;
		user.role = role;
		Ok(())
	}

	async fn grant(&self, user_id: &str, environment: EnvGrant, granted_by: &str) -> Result<(), StoreError> {
		let mut grants = self.grants.write();
		if grants
			.iter()
			.any(|g| g.user_id == user_id && g.environment == environment)
		{
			return Ok(());
		}
		grants.push(EnvAccessEntry {
			user_id: user_id.to_string(),
			environment,
			granted_by: granted_by.to_string(),
			granted_at: Utc::now(),
		});
		Ok(())
	}

	async fn revoke(&self, user_id: &str, environment: EnvGrant) -> Result<(), StoreError> {
		let mut grants = self.grants.write();
		let before = grants.len();
		grants.retain(|g| !(g.user_id == user_id && g.environment == environment));
		if grants.len() == before {
			return Err(StoreError::NotFound(format!(
				"No grant for user '{user_id}' on environment '{}'",
				environment.as_str()
			)));
		}
		Ok(())
	}

	async fn grants_for(&self, user_id: &str) -> Vec<EnvAccessEntry> {
		self
			.grants
			.read()
			.iter()
			.filter(|g| g.user_id == user_id)
			.cloned()
			.collect()
	}

	async fn all_grants(&self) -> Vec<EnvAccessEntry> {
		self.grants.read().clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::models::Environment;

	#[tokio::test]
	async fn get_or_create_is_idempotent() {
		let repo = InMemoryUserRepository::new();
		let a = repo.get_or_create("jdoe", "smartcard", Role::Viewer).await;
		let b = repo.get_or_create("jdoe", "smartcard", Role::Admin).await;
		assert_eq!(a.role, b.role);
		assert_eq!(b.role, Role::Viewer);
	}

	#[tokio::test]
	async fn wildcard_and_specific_grants_coexist() {
		let repo = InMemoryUserRepository::new();
		repo.grant("u1", EnvGrant::Environment(Environment::Dev), "admin")
			.await
			.unwrap();
		repo.grant("u1", EnvGrant::Wildcard, "admin").await.unwrap();
		assert_eq!(repo.grants_for("u1").await.len(), 2);
	}

	#[tokio::test]
	async fn revoke_missing_grant_is_not_found() {
		let repo = InMemoryUserRepository::new();
		assert!(matches!(
			repo.revoke("u1", EnvGrant::Wildcard).await,
			Err(StoreError::NotFound(_))
		));
	}
}
