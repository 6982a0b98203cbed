//! `/agents*` handlers (§4.4, §6). Every handler resolves a [`Principal`]
//! from the request's headers first, then consults the caller's
//! [`AllowedEnvironments`] before touching the registry — the handler
//! itself never reasons about role strings beyond picking which
//! `AuthResolver` capability check to run.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use controller_registry::AgentUpdate;
use controller_registry::acl::AllowedEnvironments;
use controller_store::models::{Agent, AgentStatus, EnvGrant, Environment};
use controller_store::users::EnvAccessEntry;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
	pub limit: Option<i64>,
	pub status: Option<AgentStatus>,
	pub environment: Option<String>,
}

async fn caller_scope(state: &AppState, headers: &HeaderMap) -> Result<(String, AllowedEnvironments), ApiError> {
	let (principal, _role) = state.auth.verify(headers).await?;
	let user_id = state
		.ensure_user(&principal)
		.await
		.unwrap_or_else(|| principal.identity().to_string());
	let allowed = state.allowed_environments(&user_id).await;
	Ok((user_id, allowed))
}

pub async fn list(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Agent>>, ApiError> {
	let (_, allowed) = caller_scope(&state, &headers).await?;
	let environment = query
		.environment
		.as_deref()
		.map(|s| Environment::parse(s).ok_or_else(|| controller_registry::RegistryError::Validation(format!("unknown environment '{s}'"))))
		.transpose()?;
	let limit = controller_registry::service::validate_limit(query.limit)?;
	let agents = state.registry.list(environment, query.status, limit, &allowed).await?;
	Ok(Json(agents))
}

pub async fn list_all(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Agent>>, ApiError> {
	state.auth.verify(&headers).await?;
	let limit = controller_registry::service::validate_limit(query.limit)?;
	Ok(Json(state.registry.list_all(query.status, limit).await))
}

#[derive(Serialize)]
pub struct EnvironmentsResponse {
	pub environments: Vec<Environment>,
	pub grants: Vec<EnvGrant>,
}

pub async fn list_environments(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<EnvironmentsResponse>, ApiError> {
	let (user_id, _) = caller_scope(&state, &headers).await?;
	let grants = state
		.stores
		.users
		.grants_for(&user_id)
		.await
		.into_iter()
		.map(|g| g.environment)
		.collect();
	Ok(Json(EnvironmentsResponse {
		environments: Environment::ALL.to_vec(),
		grants,
	}))
}

pub async fn get(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(name): Path<String>,
) -> Result<Json<Agent>, ApiError> {
	let (_, allowed) = caller_scope(&state, &headers).await?;
	Ok(Json(state.registry.get(&name, &allowed).await?))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
	pub agent_name: String,
	pub host: String,
	pub port: i64,
	#[serde(default)]
	pub tls_enabled: bool,
	pub environment: Environment,
	#[serde(default = "default_online")]
	pub status: AgentStatus,
}

fn default_online() -> AgentStatus {
	AgentStatus::Online
}

pub async fn register(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
	state.auth.require_admin(&headers).await?;
	let (user_id, allowed) = caller_scope(&state, &headers).await?;
	let _ = user_id;
	let port = controller_registry::service::validate_port(req.port)?;
	let agent = Agent {
		agent_name: req.agent_name,
		host: req.host,
		port,
		tls_enabled: req.tls_enabled,
		environment: req.environment,
		status: req.status,
		last_heartbeat: None,
	};
	let registered = state.registry.register(agent, &allowed).await?;
	Ok((StatusCode::CREATED, Json(registered)))
}

pub async fn update_status(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(name): Path<String>,
	Json(update): Json<AgentUpdate>,
) -> Result<Json<Agent>, ApiError> {
	state.auth.require_admin(&headers).await?;
	let (_, allowed) = caller_scope(&state, &headers).await?;
	Ok(Json(state.registry.update(&name, update, &allowed).await?))
}

pub async fn deregister(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.auth.require_admin(&headers).await?;
	let (_, allowed) = caller_scope(&state, &headers).await?;
	state.registry.deregister(&name, &allowed).await?;
	Ok(StatusCode::NO_CONTENT)
}

pub async fn ping(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(name): Path<String>,
) -> Result<Json<controller_registry::PingResult>, ApiError> {
	let (_, allowed) = caller_scope(&state, &headers).await?;
	Ok(Json(state.registry.ping(&name, &allowed).await?))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
	pub agent_name: String,
}

pub async fn heartbeat(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(req): Json<HeartbeatRequest>,
) -> Result<StatusCode, ApiError> {
	state.auth.require_agent(&headers).await?;
	state.registry.heartbeat(&req.agent_name).await?;
	Ok(StatusCode::NO_CONTENT)
}

pub async fn list_access(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<Vec<EnvAccessEntry>>, ApiError> {
	state.auth.require_admin(&headers).await?;
	Ok(Json(state.stores.users.all_grants().await))
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
	pub user_id: String,
	pub environment: String,
}

/// `*` grants require the granting admin to themselves hold `*`; a
/// specific-environment grant requires the admin to hold that environment
/// or `*` (§6 "admin (must hold target env or `*`; `*` grants require
/// `*`)").
fn may_grant(allowed: &AllowedEnvironments, target: EnvGrant) -> bool {
	match target {
		EnvGrant::Wildcard => matches!(allowed, AllowedEnvironments::Wildcard),
		EnvGrant::Environment(e) => allowed.contains(e),
	}
}

pub async fn grant_access(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(req): Json<GrantRequest>,
) -> Result<StatusCode, ApiError> {
	state.auth.require_admin(&headers).await?;
	let (admin_id, allowed) = caller_scope(&state, &headers).await?;
	let environment = EnvGrant::parse(&req.environment)
		.ok_or_else(|| controller_registry::RegistryError::Validation(format!("unknown environment '{}'", req.environment)))?;
	if !may_grant(&allowed, environment) {
		return Err(controller_registry::RegistryError::EnvironmentForbidden(req.environment).into());
	}
	state.stores.users.grant(&req.user_id, environment, &admin_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
	pub user_id: String,
	pub environment: String,
}

pub async fn revoke_access(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(req): Json<RevokeRequest>,
) -> Result<StatusCode, ApiError> {
	state.auth.require_admin(&headers).await?;
	let (_, allowed) = caller_scope(&state, &headers).await?;
	let environment = EnvGrant::parse(&req.environment)
		.ok_or_else(|| controller_registry::RegistryError::Validation(format!("unknown environment '{}'", req.environment)))?;
	if !may_grant(&allowed, environment) {
		return Err(controller_registry::RegistryError::EnvironmentForbidden(req.environment).into());
	}
	state.stores.users.revoke(&req.user_id, environment).await?;
	Ok(StatusCode::NO_CONTENT)
}
