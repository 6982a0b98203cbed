//! Resolved caller identity and outgoing request rewriting (§4.1 steps 3-4).

use hyper::HeaderMap;
use hyper::header::{HeaderName, HeaderValue};

use crate::config::IdentityHeaderNames;

/// What the proxy established about the caller before forwarding the
/// request (§4.1 step 3, branches a-c). `auth_method` is one of
/// `smartcard`, `proxy`, `native` — matching `controller_auth::resolver`'s
/// `STRONG_AUTH_METHODS` (smartcard/native) plus the session-cookie path
/// (proxy), which the auth resolver also treats as strong.
#[derive(Clone, Debug)]
pub struct RequestIdentity {
	pub auth_method: String,
	pub cn: String,
	pub cert_dn: String,
	pub domain: String,
}

impl RequestIdentity {
	pub fn smartcard(cn: String, cert_dn: String, domain: String) -> Self {
		Self {
			auth_method: "smartcard".to_string(),
			cn,
			cert_dn,
			domain,
		}
	}

	pub fn native(user: String, domain: String) -> Self {
		Self {
			auth_method: "native".to_string(),
			cert_dn: String::new(),
			cn: user,
			domain,
		}
	}

	pub fn proxy_session(user_id: String) -> Self {
		Self {
			auth_method: "proxy".to_string(),
			cert_dn: String::new(),
			cn: user_id,
			domain: String::new(),
		}
	}
}

/// Headers that are never forwarded to the backend: connection-scoped
/// (`keep-alive`, `upgrade`) and the inbound authentication material, which
/// the proxy has already consumed and replaced with its own identity
/// headers (§4.1 step 4). `upgrade` is kept for WebSocket routes, which
/// must preserve it verbatim (§4.1 step 5).
const HOP_BY_HOP: &[&str] = &["keep-alive", "proxy-authorization", "authorization"];

pub fn strip_hop_by_hop(headers: &mut HeaderMap, preserve_upgrade: bool) {
	for name in HOP_BY_HOP {
		headers.remove(*name);
	}
	if !preserve_upgrade {
		headers.remove("upgrade");
	}
}

/// Injects the resolved identity plus `X-Forwarded-{For,Proto}` into the
/// outgoing request, and overwrites `Host` with the backend authority.
/// `preserve_upgrade` keeps the `Upgrade` header intact for WebSocket
/// routes (§4.1 step 5); plain HTTP routes strip it as hop-by-hop.
pub fn rewrite_headers(
	headers: &mut HeaderMap,
	names: &IdentityHeaderNames,
	identity: &RequestIdentity,
	client_ip: &str,
	backend_authority: &str,
	preserve_upgrade: bool,
) {
	strip_hop_by_hop(headers, preserve_upgrade);
	set(headers, &names.cert_cn, &identity.cn);
	set(headers, &names.cert_dn, &identity.cert_dn);
	set(headers, &names.auth_method, &identity.auth_method);
	set(headers, "X-Forwarded-For", client_ip);
	set(headers, "X-Forwarded-Proto", "https");
	set(headers, "Host", backend_authority);
}

fn set(headers: &mut HeaderMap, name: &str, value: &str) {
	let Ok(name) = HeaderName::try_from(name) else {
		return;
	};
	let Ok(value) = HeaderValue::from_str(value) else {
		return;
	};
	headers.insert(name, value);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rewrite_strips_inbound_authorization() {
		let mut headers = HeaderMap::new();
		headers.insert(hyper::header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
		let identity = RequestIdentity::smartcard("jdoe".to_string(), "CN=jdoe,O=Corp".to_string(), "CORP".to_string());
		rewrite_headers(
			&mut headers,
			&IdentityHeaderNames::default(),
			&identity,
			"1.2.3.4",
			"10.0.0.5:8080",
			false,
		);
		assert!(!headers.contains_key(hyper::header::AUTHORIZATION));
		assert_eq!(headers.get("X-Client-Cert-CN").unwrap(), "jdoe");
		assert_eq!(headers.get("X-Forwarded-For").unwrap(), "1.2.3.4");
		assert_eq!(headers.get("Host").unwrap(), "10.0.0.5:8080");
	}
}
