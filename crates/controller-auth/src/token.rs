use chrono::{DateTime, Utc};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::principal::Role;

/// A long-lived bearer credential (`X-Admin-Token` / `X-Agent-Token`).
/// Revocation is soft: the row is kept for audit but `revoked` rejects it.
#[derive(Clone, Debug)]
pub struct TokenRecord {
	pub value: String,
	pub role: Role,
	pub token_name: String,
	pub revoked: bool,
}

/// Generates a fresh 256-bit opaque token, hex-encoded.
pub fn generate_token_value() -> String {
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);
	hex::encode(bytes)
}

/// Constant-time comparison so token lookup timing doesn't leak how many
/// leading bytes matched. In a realistic deployment this is run against a
/// lookup-by-hash scheme (§4.3); this helper is the comparison primitive
/// both that and the in-memory test store use.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
	let a = a.as_bytes();
	let b = b.as_bytes();
	if a.len() != b.len() {
		return false;
	}
	a.ct_eq(b).into()
}

/// A single-use re-execution credential, bound to one workflow.
#[derive(Clone, Debug)]
pub struct ExecutionToken {
	pub token: String,
	pub workflow_id: String,
	pub expires_at: DateTime<Utc>,
	pub used: bool,
	pub used_by: Option<String>,
}

impl ExecutionToken {
	pub fn new(workflow_id: impl Into<String>, ttl: chrono::Duration) -> Self {
		Self {
			token: generate_token_value(),
			workflow_id: workflow_id.into(),
			expires_at: Utc::now() + ttl,
			used: false,
			used_by: None,
		}
	}

	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		now > self.expires_at
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn constant_time_eq_matches_string_eq() {
		assert!(constant_time_eq("abc123", "abc123"));
		assert!(!constant_time_eq("abc123", "abc124"));
		assert!(!constant_time_eq("abc123", "abc12"));
	}

	#[test]
	fn generated_token_is_64_hex_chars() {
		let t = generate_token_value();
		assert_eq!(t.len(), 64);
		assert!(t.chars().all(|c| c.is_ascii_hexdigit()));
	}
}
