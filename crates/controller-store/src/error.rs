use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors a repository method can return. `detail` strings are part of the
/// external contract (§7/§8) and must be preserved verbatim by callers that
/// forward them into an HTTP response.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
	#[error("{0}")]
	NotFound(String),
	#[error("{0}")]
	Conflict(String),
	#[error("{0}")]
	Validation(String),
}

impl StoreError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			StoreError::NotFound(_) => StatusCode::NOT_FOUND,
			StoreError::Conflict(_) => StatusCode::CONFLICT,
			StoreError::Validation(_) => StatusCode::BAD_REQUEST,
		}
	}
}

impl IntoResponse for StoreError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		(status, Json(json!({ "detail": self.to_string() }))).into_response()
	}
}
