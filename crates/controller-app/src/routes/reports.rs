//! `/reports*` handlers (§4.6, §6), including the `/reports/ws/{run_id}`
//! live-output stream.

use std::time::Duration;

use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;

use controller_reports::frame::StreamFrame;
use controller_reports::service::RunRequest;
use controller_store::models::{ReportRun, ReportScript};

use crate::error::ApiError;
use crate::state::AppState;

/// Idle ceiling for a stream subscriber (§4.6): a ping goes out on this
/// cadence and a subscriber that never acknowledges is dropped, so a
/// forgotten browser tab doesn't hold a broadcast slot forever.
const PING_INTERVAL: Duration = Duration::from_secs(30);

pub async fn list_scripts(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<ReportScript>>, ApiError> {
	state.auth.verify(&headers).await?;
	Ok(Json(state.reports.list_scripts().await))
}

pub async fn get_script(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(script_id): Path<String>,
) -> Result<Json<ReportScript>, ApiError> {
	state.auth.verify(&headers).await?;
	Ok(Json(state.reports.get_script(&script_id).await?))
}

pub async fn register_script(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(script): Json<ReportScript>,
) -> Result<(StatusCode, Json<ReportScript>), ApiError> {
	state.auth.require_admin(&headers).await?;
	let created = state.reports.register_script(script).await;
	Ok((StatusCode::CREATED, Json(created)))
}

pub async fn deregister_script(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(script_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.auth.require_admin(&headers).await?;
	state.reports.deregister_script(&script_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

pub async fn run(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(script_id): Path<String>,
	Json(req): Json<RunRequest>,
) -> Result<(StatusCode, Json<ReportRun>), ApiError> {
	let (principal, _) = state.auth.verify(&headers).await?;
	let created = state.reports.run(&script_id, req, principal.identity()).await?;
	Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
	pub limit: Option<usize>,
}

pub async fn history(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ReportRun>>, ApiError> {
	state.auth.verify(&headers).await?;
	Ok(Json(state.reports.history(query.limit).await))
}

pub async fn result(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(run_id): Path<String>,
) -> Result<Json<ReportRun>, ApiError> {
	state.auth.verify(&headers).await?;
	Ok(Json(state.reports.get(&run_id).await?))
}

pub async fn cancel(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(run_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.auth.verify(&headers).await?;
	state.reports.cancel(&run_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

pub async fn stream(
	ws: WebSocketUpgrade,
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
	state.auth.verify(&headers).await?;
	let (replay, receiver) = state.reports.subscribe(&run_id).await?;
	Ok(ws.on_upgrade(move |socket| forward_stream(socket, replay, receiver)))
}

async fn forward_stream(mut socket: WebSocket, replay: Vec<StreamFrame>, mut receiver: tokio::sync::broadcast::Receiver<StreamFrame>) {
	for frame in replay {
		let Ok(text) = serde_json::to_string(&frame) else { continue };
		if socket.send(Message::Text(text.into())).await.is_err() {
			return;
		}
		if matches!(frame, StreamFrame::Complete { .. }) {
			let _ = socket.close().await;
			return;
		}
	}

	loop {
		tokio::select! {
			frame = receiver.recv() => {
				let frame = match frame {
					Ok(frame) => frame,
					Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
					Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
				};
				let is_complete = matches!(frame, StreamFrame::Complete { .. });
				let Ok(text) = serde_json::to_string(&frame) else { continue };
				if socket.send(Message::Text(text.into())).await.is_err() {
					return;
				}
				if is_complete {
					break;
				}
			}
			_ = tokio::time::sleep(PING_INTERVAL) => {
				if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
					return;
				}
			}
		}
	}
	let _ = socket.close().await;
}
