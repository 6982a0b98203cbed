//! Failure semantics for the front-door proxy (§4.1 "Failure semantics"):
//! each variant maps to a specific status code, following the same
//! `status_code()` + `IntoResponse` convention used by every other
//! subsystem's error enum, even though the proxy itself speaks raw `hyper`
//! responses rather than axum ones.

use hyper::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
	#[error("no route matched {0}")]
	RouteNotFound(String),
	#[error("unauthorized")]
	Unauthorized,
	#[error("native-auth message could not be parsed: {0}")]
	NativeAuthParse(#[from] controller_auth::native::NativeAuthError),
	#[error("backend unreachable: {0}")]
	BackendUnreachable(String),
	#[error("backend timed out")]
	BackendTimeout,
	#[error("internal proxy fault: {0}")]
	Internal(String),
}

impl ProxyError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			ProxyError::RouteNotFound(_) => StatusCode::NOT_FOUND,
			ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
			ProxyError::NativeAuthParse(_) => StatusCode::UNAUTHORIZED,
			ProxyError::BackendUnreachable(_) => StatusCode::BAD_GATEWAY,
			ProxyError::BackendTimeout => StatusCode::GATEWAY_TIMEOUT,
			ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}
