//! Assembles the full `axum::Router` from each resource's sub-router (§6).

pub mod agents;
pub mod reports;
pub mod workflows;

use axum::Router;
use axum::routing::{delete, get, post, put};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	let agent_routes = Router::new()
		.route("/", get(agents::list).post(agents::register))
		.route("/all", get(agents::list_all))
		.route("/environments", get(agents::list_environments))
		.route("/heartbeat", post(agents::heartbeat))
		.route("/access/users", get(agents::list_access))
		.route("/access/grant", post(agents::grant_access))
		.route("/access/revoke", delete(agents::revoke_access))
		.route("/{name}", get(agents::get).delete(agents::deregister))
		.route("/{name}/status", put(agents::update_status))
		.route("/{name}/ping", post(agents::ping));

	let workflow_routes = Router::new()
		.route("/", get(workflows::list).post(workflows::create))
		.route("/{id}", get(workflows::get))
		.route("/{id}/approve", post(workflows::approve))
		.route("/{id}/deny", post(workflows::deny))
		.route("/{id}/execute", post(workflows::execute))
		.route("/{id}/reexec/request", post(workflows::request_reexec))
		.route("/{id}/reexec/approve", post(workflows::approve_reexec))
		.route("/{id}/audit", get(workflows::audit));

	let report_routes = Router::new()
		.route("/scripts", get(reports::list_scripts).post(reports::register_script))
		.route("/scripts/{script_id}", get(reports::get_script).delete(reports::deregister_script))
		.route("/run/{script_id}", post(reports::run))
		.route("/history", get(reports::history))
		.route("/result/{run_id}", get(reports::result).delete(reports::cancel))
		.route("/ws/{run_id}", get(reports::stream));

	Router::new()
		.nest("/agents", agent_routes)
		.nest("/workflows", workflow_routes)
		.nest("/reports", report_routes)
		.with_state(state)
}
