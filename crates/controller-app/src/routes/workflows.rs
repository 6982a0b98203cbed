//! `/workflows*` handlers (§4.2, §6).

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;

use controller_auth::resolver::HEADER_EXECUTION_TOKEN;
use controller_store::models::{AuditEntry, Workflow};
use controller_workflow::service::{CreateWorkflowRequest, ExecuteOverrides, ExecutionOutcome};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<Workflow>>, ApiError> {
	state.auth.verify(&headers).await?;
	Ok(Json(state.workflows.list().await))
}

pub async fn create(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(req): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
	state.auth.verify(&headers).await?;
	let workflow = state.workflows.create(req).await?;
	Ok((StatusCode::CREATED, Json(workflow)))
}

pub async fn get(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(workflow_id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
	state.auth.verify(&headers).await?;
	Ok(Json(state.workflows.get(&workflow_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
	pub level: u32,
}

pub async fn approve(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(workflow_id): Path<String>,
	Json(req): Json<ApproveRequest>,
) -> Result<Json<Workflow>, ApiError> {
	let (principal, _) = state.auth.require_approver(&headers).await?;
	state.workflows.approve(&workflow_id, principal.identity(), req.level).await?;
	Ok(Json(state.workflows.get(&workflow_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct DenyRequest {
	pub reason: Option<String>,
}

pub async fn deny(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(workflow_id): Path<String>,
	Json(req): Json<DenyRequest>,
) -> Result<Json<Workflow>, ApiError> {
	let (principal, _) = state.auth.require_approver(&headers).await?;
	state.workflows.deny(&workflow_id, principal.identity(), req.reason).await?;
	Ok(Json(state.workflows.get(&workflow_id).await?))
}

pub async fn execute(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(workflow_id): Path<String>,
	Json(overrides): Json<ExecuteOverrides>,
) -> Result<Json<ExecutionOutcome>, ApiError> {
	let (principal, _) = state.auth.require_admin(&headers).await?;
	// A caller presenting a one-time re-execution token consumes it here,
	// atomically, rather than in a separate step — `execute` needs to know
	// whether one was honored so it can bypass the normal approval gate.
	let reexec_token_consumed = if headers.contains_key(HEADER_EXECUTION_TOKEN) {
		state
			.auth
			.require_execution_token(&headers, &workflow_id, principal.identity())
			.await?;
		true
	} else {
		false
	};
	let outcome = state.workflows.execute(&workflow_id, overrides, reexec_token_consumed).await?;
	Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ReexecRequestBody {
	pub requester_email: String,
	pub note: Option<String>,
}

pub async fn request_reexec(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(workflow_id): Path<String>,
	Json(req): Json<ReexecRequestBody>,
) -> Result<(StatusCode, Json<controller_store::models::ReexecRequest>), ApiError> {
	let (principal, _) = state.auth.verify(&headers).await?;
	let request = state
		.workflows
		.request_reexec(&workflow_id, principal.identity(), Some(req.requester_email), req.note)
		.await?;
	Ok((StatusCode::CREATED, Json(request)))
}

#[derive(serde::Serialize)]
pub struct ReexecApprovedResponse {
	pub token: String,
	pub expires_at: chrono::DateTime<chrono::Utc>,
}

pub async fn approve_reexec(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(request_id): Path<String>,
) -> Result<Json<ReexecApprovedResponse>, ApiError> {
	// The approver-JWT caller class maps onto the same approver capability
	// check used for ordinary approvals — the execution token minted here
	// is the artifact a reexec caller actually redeems.
	state.auth.require_approver(&headers).await?;
	let token = state.workflows.approve_reexec(&request_id).await?;
	Ok(Json(ReexecApprovedResponse {
		token: token.token,
		expires_at: token.expires_at,
	}))
}

pub async fn audit(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(workflow_id): Path<String>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
	state.auth.verify(&headers).await?;
	Ok(Json(state.workflows.audit_log(&workflow_id).await))
}
