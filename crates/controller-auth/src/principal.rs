use serde::{Deserialize, Serialize};

/// A closed variant for the authenticated caller of an operation. Derived
/// by the [`crate::resolver::AuthResolver`] from proxy-injected identity
/// headers or a bearer token — never reconstructed ad hoc from a generic
/// claims map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
	/// Authenticated via a client TLS certificate.
	Cert {
		cn: String,
		dn: Option<String>,
		domain: Option<String>,
	},
	/// Authenticated via the native-auth challenge/response fallback.
	Native { user: String, domain: Option<String> },
	/// Authenticated via an existing proxy session cookie.
	ProxySession { user_id: String },
	/// Authenticated via a long-lived bearer token (`X-Admin-Token`,
	/// `X-Agent-Token`).
	Token { token_name: String, role: Role },
	/// Authenticated via a one-time execution token bound to a workflow.
	ExecToken { token: String, workflow_id: String },
}

impl Principal {
	/// The auth method string injected into `X-Auth-Method` for downstream
	/// services, per the identity header contract in §6.
	pub fn auth_method(&self) -> &'static str {
		match self {
			Principal::Cert { .. } => "smartcard",
			Principal::Native { .. } => "native",
			Principal::ProxySession { .. } => "proxy",
			Principal::Token { .. } => "token",
			Principal::ExecToken { .. } => "token",
		}
	}

	/// The raw identity string this principal was derived from, before role
	/// resolution — used to look up or create the backing `User` row.
	pub fn identity(&self) -> &str {
		match self {
			Principal::Cert { cn, .. } => cn,
			Principal::Native { user, .. } => user,
			Principal::ProxySession { user_id } => user_id,
			Principal::Token { token_name, .. } => token_name,
			Principal::ExecToken { token, .. } => token,
		}
	}
}

/// Roles a [`Principal`] may be resolved to. Role is always derived
/// *externally* to `Principal` (by the auth resolver, consulting the user
/// directory), never carried as a field inside the enum's auth-method
/// variants — this keeps "how you authenticated" and "what you're allowed
/// to do" independently testable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Viewer,
	Ops,
	Approver,
	Admin,
	Agent,
	System,
}

impl Role {
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Viewer => "viewer",
			Role::Ops => "ops",
			Role::Approver => "approver",
			Role::Admin => "admin",
			Role::Agent => "agent",
			Role::System => "system",
		}
	}
}

impl std::fmt::Display for Role {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}
