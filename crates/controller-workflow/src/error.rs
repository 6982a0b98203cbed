use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use controller_store::StoreError;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error("{0}")]
	Validation(String),
}

impl WorkflowError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			WorkflowError::Store(e) => e.status_code(),
			WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
		}
	}
}

impl IntoResponse for WorkflowError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		(status, Json(json!({ "detail": self.to_string() }))).into_response()
	}
}
