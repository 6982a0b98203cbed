//! The environment-ACL algebra from §4.4: `allowed(user) = { env :
//! (user_id, env) ∈ EnvAccess } ∪ (if * ∈ user's grants then
//! {DEV,TEST,PROD})`.

use controller_store::models::{EnvGrant, Environment};
use controller_store::users::EnvAccessEntry;

/// The resolved form of a user's environment grants. `Wildcard` subsumes
/// every specific environment (§3 invariant); `Explicit` restricts to the
/// listed set, which may be empty (no grants ⇒ sees zero agents, §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowedEnvironments {
	Wildcard,
	Explicit(Vec<Environment>),
}

impl AllowedEnvironments {
	pub fn from_grants(grants: &[EnvAccessEntry]) -> Self {
		if grants.iter().any(|g| g.environment == EnvGrant::Wildcard) {
			return AllowedEnvironments::Wildcard;
		}
		let envs = grants
			.iter()
			.filter_map(|g| match g.environment {
				EnvGrant::Environment(e) => Some(e),
				EnvGrant::Wildcard => None,
			})
			.collect();
		AllowedEnvironments::Explicit(envs)
	}

	pub fn contains(&self, env: Environment) -> bool {
		match self {
			AllowedEnvironments::Wildcard => true,
			AllowedEnvironments::Explicit(envs) => envs.contains(&env),
		}
	}

	/// `None` means "no environment restriction needed" for a repository
	/// filter (the wildcard case); `Some` is the explicit allow-list,
	/// including the empty list for "sees zero agents".
	pub fn as_filter(&self) -> Option<Vec<Environment>> {
		match self {
			AllowedEnvironments::Wildcard => None,
			AllowedEnvironments::Explicit(envs) => Some(envs.clone()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;

	fn grant(env: EnvGrant) -> EnvAccessEntry {
		EnvAccessEntry {
			user_id: "u1".to_string(),
			environment: env,
			granted_by: "admin".to_string(),
			granted_at: Utc::now(),
		}
	}

	#[test]
	fn wildcard_subsumes_every_environment() {
		let allowed = AllowedEnvironments::from_grants(&[grant(EnvGrant::Wildcard)]);
		for env in Environment::ALL {
			assert!(allowed.contains(env));
		}
		assert_eq!(allowed.as_filter(), None);
	}

	#[test]
	fn no_grants_means_zero_agents() {
		let allowed = AllowedEnvironments::from_grants(&[]);
		assert!(!allowed.contains(Environment::Dev));
		assert_eq!(allowed.as_filter(), Some(vec![]));
	}

	#[test]
	fn explicit_grant_restricts_to_listed_environments() {
		let allowed = AllowedEnvironments::from_grants(&[grant(EnvGrant::Environment(Environment::Dev))]);
		assert!(allowed.contains(Environment::Dev));
		assert!(!allowed.contains(Environment::Prod));
	}
}
