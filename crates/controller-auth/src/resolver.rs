use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::error::AuthError;
use crate::identity;
use crate::principal::{Principal, Role};
use crate::token::TokenRecord;

pub const HEADER_CERT_CN: &str = "X-Client-Cert-CN";
pub const HEADER_CERT_DN: &str = "X-Client-Cert-DN";
pub const HEADER_AUTH_METHOD: &str = "X-Auth-Method";
pub const HEADER_ADMIN_TOKEN: &str = "X-Admin-Token";
pub const HEADER_AGENT_TOKEN: &str = "X-Agent-Token";
pub const HEADER_EXECUTION_TOKEN: &str = "X-Execution-Token";

/// Roles trusted by policy as admin regardless of what the user directory
/// says, because they were authenticated by a strong enterprise mechanism
/// upstream (client cert, native-auth, or an already-established proxy
/// session) rather than a bearer token.
const STRONG_AUTH_METHODS: [&str; 3] = ["smartcard", "native", "proxy"];

/// Looks up the role and any stored bearer token for a resolved identity.
/// Implemented by the store crate; kept as a trait here so the resolver has
/// no dependency on a concrete persistence layer.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
	async fn role_for_username(&self, username: &str) -> Option<Role>;
	async fn lookup_bearer_token(&self, value: &str) -> Option<TokenRecord>;
}

/// Validates and consumes one-time execution tokens (§4.3,
/// `require_execution_token`).
#[async_trait]
pub trait ExecutionTokenDirectory: Send + Sync {
	/// Atomically checks existence/expiry/workflow binding and marks the
	/// token used. A second call with the same token value must fail.
	async fn try_consume(
		&self,
		workflow_id: &str,
		token_value: &str,
		consumed_by: &str,
	) -> Result<(), AuthError>;
}

pub struct AuthResolver {
	directory: Arc<dyn PrincipalDirectory>,
	exec_tokens: Arc<dyn ExecutionTokenDirectory>,
	default_role: Role,
}

impl AuthResolver {
	pub fn new(
		directory: Arc<dyn PrincipalDirectory>,
		exec_tokens: Arc<dyn ExecutionTokenDirectory>,
		default_role: Role,
	) -> Self {
		Self {
			directory,
			exec_tokens,
			default_role,
		}
	}

	fn header(headers: &HeaderMap, name: &str) -> Option<String> {
		headers
			.get(name)
			.and_then(|v| v.to_str().ok())
			.map(|v| v.trim().to_string())
			.filter(|v| !v.is_empty())
	}

	async fn principal_from_headers(&self, headers: &HeaderMap) -> Option<(Principal, Role)> {
		// Header precedence from the original system's
		// `get_runtime_user_from_request`: X-Auth-User takes priority over the
		// cert CN when both are present, then X-Forwarded-User, X-Remote-User.
		for header in ["X-Auth-User", "X-Forwarded-User", "X-Remote-User"] {
			if let Some(raw) = Self::header(headers, header) {
				let user = identity::normalize(&raw);
				if user.is_empty() {
					continue;
				}
				let role = self
					.directory
					.role_for_username(&user)
					.await
					.unwrap_or(self.default_role);
				return Some((Principal::Native { user, domain: None }, role));
			}
		}

		if let Some(cn) = Self::header(headers, HEADER_CERT_CN) {
			let cn = identity::normalize(&cn);
			let role = self
				.directory
				.role_for_username(&cn)
				.await
				.unwrap_or(self.default_role);
			// The proxy carries the caller's identity in `cert_cn` for all
			// three of its auth branches (cert, native, session), and tags
			// which one via `auth_method` (§4.1 step 3/§6 header contract) —
			// reconstruct the matching `Principal` variant rather than
			// collapsing every proxy-forwarded caller into `Cert`.
			let principal = match Self::header(headers, HEADER_AUTH_METHOD).as_deref() {
				Some("native") => Principal::Native { user: cn, domain: None },
				Some("proxy") => Principal::ProxySession { user_id: cn },
				_ => Principal::Cert {
					cn,
					dn: Self::header(headers, HEADER_CERT_DN),
					domain: None,
				},
			};
			return Some((principal, role));
		}

		None
	}

	async fn principal_from_token(&self, headers: &HeaderMap) -> Option<Result<(Principal, Role), AuthError>> {
		for header in [HEADER_ADMIN_TOKEN, HEADER_AGENT_TOKEN] {
			let Some(value) = Self::header(headers, header) else {
				continue;
			};
			return Some(self.resolve_token(&value).await);
		}
		None
	}

	async fn resolve_token(&self, value: &str) -> Result<(Principal, Role), AuthError> {
		let record = self
			.directory
			.lookup_bearer_token(value)
			.await
			.ok_or(AuthError::UnknownToken)?;
		if record.revoked {
			return Err(AuthError::TokenRevoked);
		}
		Ok((
			Principal::Token {
				token_name: record.token_name,
				role: record.role,
			},
			record.role,
		))
	}

	/// Resolves the caller's [`Principal`] and [`Role`] from proxy-supplied
	/// identity headers, else `X-Admin-Token`, else `X-Agent-Token`.
	pub async fn verify(&self, headers: &HeaderMap) -> Result<(Principal, Role), AuthError> {
		if let Some(found) = self.principal_from_headers(headers).await {
			return Ok(found);
		}
		if let Some(result) = self.principal_from_token(headers).await {
			return result;
		}
		Err(AuthError::Unauthenticated)
	}

	pub async fn require_admin(&self, headers: &HeaderMap) -> Result<(Principal, Role), AuthError> {
		let (principal, role) = self.verify(headers).await?;
		if role == Role::Admin || STRONG_AUTH_METHODS.contains(&principal.auth_method()) {
			return Ok((principal, role));
		}
		Err(AuthError::Forbidden {
			role: role.to_string(),
		})
	}

	pub async fn require_approver(&self, headers: &HeaderMap) -> Result<(Principal, Role), AuthError> {
		let (principal, role) = self.verify(headers).await?;
		if matches!(role, Role::Approver | Role::Admin) || STRONG_AUTH_METHODS.contains(&principal.auth_method()) {
			return Ok((principal, role));
		}
		Err(AuthError::Forbidden {
			role: role.to_string(),
		})
	}

	pub async fn require_agent(&self, headers: &HeaderMap) -> Result<(Principal, Role), AuthError> {
		let Some(value) = Self::header(headers, HEADER_AGENT_TOKEN) else {
			return Err(AuthError::Unauthenticated);
		};
		let (principal, role) = self.resolve_token(&value).await?;
		if role != Role::Agent {
			return Err(AuthError::Forbidden {
				role: role.to_string(),
			});
		}
		Ok((principal, role))
	}

	pub async fn require_execution_token(
		&self,
		headers: &HeaderMap,
		workflow_id: &str,
		consumed_by: &str,
	) -> Result<(), AuthError> {
		let value = Self::header(headers, HEADER_EXECUTION_TOKEN)
			.ok_or(AuthError::ExecutionTokenMissing)?;
		self
			.exec_tokens
			.try_consume(workflow_id, &value, consumed_by)
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;
	use std::collections::HashMap;

	#[derive(Default)]
	struct FakeDirectory {
		roles: HashMap<String, Role>,
		tokens: HashMap<String, TokenRecord>,
	}

	#[async_trait]
	impl PrincipalDirectory for FakeDirectory {
		async fn role_for_username(&self, username: &str) -> Option<Role> {
			self.roles.get(username).copied()
		}
		async fn lookup_bearer_token(&self, value: &str) -> Option<TokenRecord> {
			self.tokens.get(value).cloned()
		}
	}

	#[derive(Default)]
	struct FakeExecTokens {
		consumed: Mutex<Vec<String>>,
	}

	#[async_trait]
	impl ExecutionTokenDirectory for FakeExecTokens {
		async fn try_consume(
			&self,
			_workflow_id: &str,
			token_value: &str,
			_consumed_by: &str,
		) -> Result<(), AuthError> {
			let mut consumed = self.consumed.lock();
			if consumed.contains(&token_value.to_string()) {
				return Err(AuthError::ExecutionTokenUsed);
			}
			consumed.push(token_value.to_string());
			Ok(())
		}
	}

	fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
		let mut h = HeaderMap::new();
		for (k, v) in pairs {
			h.insert(
				axum::http::HeaderName::try_from(*k).unwrap(),
				axum::http::HeaderValue::from_str(v).unwrap(),
			);
		}
		h
	}

	fn resolver(roles: HashMap<String, Role>, tokens: HashMap<String, TokenRecord>) -> AuthResolver {
		AuthResolver::new(
			Arc::new(FakeDirectory { roles, tokens }),
			Arc::new(FakeExecTokens::default()),
			Role::Viewer,
		)
	}

	#[tokio::test]
	async fn cert_header_resolves_with_looked_up_role() {
		let mut roles = HashMap::new();
		roles.insert("jdoe".to_string(), Role::Ops);
		let r = resolver(roles, HashMap::new());
		let h = headers(&[(HEADER_CERT_CN, "jdoe"), (HEADER_CERT_DN, "CN=jdoe,OU=IT")]);
		let (principal, role) = r.verify(&h).await.unwrap();
		assert_eq!(role, Role::Ops);
		assert_eq!(principal.auth_method(), "smartcard");
	}

	#[tokio::test]
	async fn auth_user_header_takes_priority_over_cert_cn() {
		let mut roles = HashMap::new();
		roles.insert("alice".to_string(), Role::Ops);
		roles.insert("jdoe".to_string(), Role::Viewer);
		let r = resolver(roles, HashMap::new());
		let h = headers(&[("X-Auth-User", "alice"), (HEADER_CERT_CN, "jdoe")]);
		let (principal, role) = r.verify(&h).await.unwrap();
		assert_eq!(role, Role::Ops);
		assert_eq!(principal.auth_method(), "native");
	}

	#[tokio::test]
	async fn unknown_user_gets_default_role() {
		let r = resolver(HashMap::new(), HashMap::new());
		let h = headers(&[(HEADER_CERT_CN, "newperson")]);
		let (_, role) = r.verify(&h).await.unwrap();
		assert_eq!(role, Role::Viewer);
	}

	#[tokio::test]
	async fn no_identity_is_unauthenticated() {
		let r = resolver(HashMap::new(), HashMap::new());
		let h = headers(&[]);
		assert!(matches!(r.verify(&h).await, Err(AuthError::Unauthenticated)));
	}

	#[tokio::test]
	async fn revoked_admin_token_is_rejected() {
		let mut tokens = HashMap::new();
		tokens.insert(
			"tok-1".to_string(),
			TokenRecord {
				value: "tok-1".to_string(),
				role: Role::Admin,
				token_name: "ci-bot".to_string(),
				revoked: true,
			},
		);
		let r = resolver(HashMap::new(), tokens);
		let h = headers(&[(HEADER_ADMIN_TOKEN, "tok-1")]);
		assert!(matches!(r.verify(&h).await, Err(AuthError::TokenRevoked)));
	}

	#[tokio::test]
	async fn require_admin_trusts_strong_auth_method() {
		let r = resolver(HashMap::new(), HashMap::new());
		let h = headers(&[(HEADER_CERT_CN, "jdoe")]);
		// jdoe has the default Viewer role but arrived via smartcard, which
		// policy trusts as admin.
		assert!(r.require_admin(&h).await.is_ok());
	}

	#[tokio::test]
	async fn require_agent_rejects_non_agent_tokens() {
		let mut tokens = HashMap::new();
		tokens.insert(
			"tok-admin".to_string(),
			TokenRecord {
				value: "tok-admin".to_string(),
				role: Role::Admin,
				token_name: "root".to_string(),
				revoked: false,
			},
		);
		let r = resolver(HashMap::new(), tokens);
		let h = headers(&[(HEADER_AGENT_TOKEN, "tok-admin")]);
		assert!(matches!(
			r.require_agent(&h).await,
			Err(AuthError::Forbidden { .. })
		));
	}

	#[tokio::test]
	async fn execution_token_cannot_be_consumed_twice() {
		let r = resolver(HashMap::new(), HashMap::new());
		let h = headers(&[(HEADER_EXECUTION_TOKEN, "exec-1")]);
		assert!(r.require_execution_token(&h, "wf-1", "jdoe").await.is_ok());
		assert!(matches!(
			r.require_execution_token(&h, "wf-1", "jdoe").await,
			Err(AuthError::ExecutionTokenUsed)
		));
	}
}
