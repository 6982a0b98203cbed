use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
	#[error("no identity headers, admin token, or agent token found")]
	Unauthenticated,
	#[error("token is revoked")]
	TokenRevoked,
	#[error("token not recognized")]
	UnknownToken,
	#[error("role {role} is not permitted to perform this action")]
	Forbidden { role: String },
	#[error("execution token not found")]
	ExecutionTokenMissing,
	#[error("execution token already used")]
	ExecutionTokenUsed,
	#[error("execution token expired")]
	ExecutionTokenExpired,
	#[error("execution token is not bound to workflow {0}")]
	ExecutionTokenWrongWorkflow(String),
}

impl AuthError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			AuthError::Unauthenticated
			| AuthError::TokenRevoked
			| AuthError::UnknownToken
			| AuthError::ExecutionTokenMissing
			| AuthError::ExecutionTokenUsed
			| AuthError::ExecutionTokenExpired
			| AuthError::ExecutionTokenWrongWorkflow(_) => StatusCode::UNAUTHORIZED,
			AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
		}
	}
}

impl IntoResponse for AuthError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		let detail = self.to_string();
		(status, Json(json!({ "detail": detail }))).into_response()
	}
}
