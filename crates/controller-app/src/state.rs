//! Shared application state handed to every axum handler (§4.1-§4.6).
//!
//! Assembly happens once in `main`; handlers only ever borrow `Arc` clones
//! out of this struct via axum's `State` extractor.

use std::sync::Arc;
use std::time::Duration;

use controller_auth::{AuthResolver, Principal, Role};
use controller_notify::Notifier;
use controller_registry::AgentRegistry;
use controller_registry::acl::AllowedEnvironments;
use controller_reports::ReportDispatcher;
use controller_store::Stores;
use controller_workflow::WorkflowService;

#[derive(Clone)]
pub struct AppState {
	pub auth: Arc<AuthResolver>,
	pub stores: Stores,
	pub registry: Arc<AgentRegistry>,
	pub workflows: Arc<WorkflowService>,
	pub reports: Arc<ReportDispatcher>,
	pub notifier: Arc<Notifier>,
	pub default_role: Role,
}

impl AppState {
	/// Resolves the backing [`controller_store::models::User`] row for a
	/// caller, creating it on first sight (§3 User lifecycle). Bearer-token
	/// and execution-token principals never reach here: their `Role` is
	/// carried on the token itself, not derived from a user row.
	pub async fn ensure_user(&self, principal: &Principal) -> Option<String> {
		match principal {
			Principal::Cert { .. } | Principal::Native { .. } | Principal::ProxySession { .. } => {
				let user = self
					.stores
					.users
					.get_or_create(principal.identity(), principal.auth_method(), self.default_role)
					.await;
				Some(user.user_id)
			}
			Principal::Token { .. } | Principal::ExecToken { .. } => None,
		}
	}

	/// The environment ACL derived from a user's granted environments
	/// (§4.4). Admin is never a bypass here — registry write operations
	/// still require an explicit grant on the target environment.
	pub async fn allowed_environments(&self, user_id: &str) -> AllowedEnvironments {
		AllowedEnvironments::from_grants(&self.stores.users.grants_for(user_id).await)
	}

	pub fn agent_stale_after(&self) -> Duration {
		self.registry.stale_after()
	}
}
