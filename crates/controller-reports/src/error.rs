use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use controller_store::StoreError;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error("{0}")]
	Validation(String),
	#[error("agent '{0}' is not online")]
	AgentOffline(String),
	#[error("agent unreachable: {0}")]
	Unreachable(String),
	#[error("agent timed out: {0}")]
	Timeout(String),
}

impl ReportError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			ReportError::Store(e) => e.status_code(),
			ReportError::Validation(_) => StatusCode::BAD_REQUEST,
			ReportError::AgentOffline(_) => StatusCode::CONFLICT,
			ReportError::Unreachable(_) => StatusCode::BAD_GATEWAY,
			ReportError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
		}
	}
}

impl IntoResponse for ReportError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		(status, Json(json!({ "detail": self.to_string() }))).into_response()
	}
}
