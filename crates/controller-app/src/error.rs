//! Unifies every sub-crate's error type into the single `Result` an axum
//! handler returns. Each variant already knows how to render itself (§7);
//! this just dispatches to the inner `IntoResponse` impl rather than
//! re-deriving the status/detail mapping.

use axum::response::{IntoResponse, Response};

use controller_auth::AuthError;
use controller_notify::NotifyError;
use controller_registry::RegistryError;
use controller_reports::ReportError;
use controller_store::StoreError;
use controller_workflow::WorkflowError;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
	#[error(transparent)]
	Auth(#[from] AuthError),
	#[error(transparent)]
	Registry(#[from] RegistryError),
	#[error(transparent)]
	Workflow(#[from] WorkflowError),
	#[error(transparent)]
	Report(#[from] ReportError),
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error("{0}")]
	Notify(String),
}

impl From<NotifyError> for ApiError {
	fn from(e: NotifyError) -> Self {
		ApiError::Notify(e.to_string())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		match self {
			ApiError::Auth(e) => e.into_response(),
			ApiError::Registry(e) => e.into_response(),
			ApiError::Workflow(e) => e.into_response(),
			ApiError::Report(e) => e.into_response(),
			ApiError::Store(e) => e.into_response(),
			ApiError::Notify(msg) => {
				tracing::error!(error = %msg, "notification delivery failed");
				(axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
			}
		}
	}
}
