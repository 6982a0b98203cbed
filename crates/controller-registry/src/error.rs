use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use controller_store::StoreError;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error("You don't have access to the {0} environment")]
	EnvironmentForbidden(String),
	#[error("{0}")]
	Validation(String),
	#[error("agent '{0}' is unreachable")]
	Unreachable(String),
}

impl RegistryError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			RegistryError::Store(e) => e.status_code(),
			RegistryError::EnvironmentForbidden(_) => StatusCode::FORBIDDEN,
			RegistryError::Validation(_) => StatusCode::BAD_REQUEST,
			RegistryError::Unreachable(_) => StatusCode::BAD_GATEWAY,
		}
	}
}

impl IntoResponse for RegistryError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		(status, Json(json!({ "detail": self.to_string() }))).into_response()
	}
}
