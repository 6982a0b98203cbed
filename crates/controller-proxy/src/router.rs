//! Outgoing path rewriting (§4.1 step 4): `strip_prefix` removes the
//! matched `path_prefix` and restores a leading `/`.

use crate::config::BackendConfig;

pub fn rewrite_path(path: &str, backend: &BackendConfig) -> String {
	if !backend.strip_prefix {
		return path.to_string();
	}
	let stripped = path.strip_prefix(backend.path_prefix.as_str()).unwrap_or(path);
	if stripped.starts_with('/') {
		stripped.to_string()
	} else {
		format!("/{stripped}")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn backend(prefix: &str, strip: bool) -> BackendConfig {
		BackendConfig {
			id: "a".to_string(),
			name: "a".to_string(),
			host: "10.0.0.1".to_string(),
			port: 8080,
			path_prefix: prefix.to_string(),
			strip_prefix: strip,
			websocket: false,
			timeout_s: 30,
			auth_required: true,
		}
	}

	#[test]
	fn strip_prefix_restores_leading_slash() {
		assert_eq!(rewrite_path("/api/v1/agents", &backend("/api/v1", true)), "/agents");
	}

	#[test]
	fn strip_prefix_of_exact_match_yields_root() {
		assert_eq!(rewrite_path("/api/v1", &backend("/api/v1", true)), "/");
	}

	#[test]
	fn without_strip_prefix_path_is_unchanged() {
		assert_eq!(rewrite_path("/api/v1/agents", &backend("/api/v1", false)), "/api/v1/agents");
	}
}
