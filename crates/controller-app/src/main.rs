//! Binary entrypoint: loads configuration, wires every service against a
//! `Stores` handle, seeds bootstrap credentials, and serves the API —
//! optionally behind the TLS front-door proxy — until a shutdown signal
//! drains in-flight work (§4.1, §5).

mod config;
mod error;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use controller_auth::{AuthResolver, Role};
use controller_core::signal::{new_shutdown, shutdown_signal};
use controller_core::telemetry::init_tracing;
use controller_notify::{LogMailer, Mailer, Notifier, SmtpMailer};
use controller_proxy::ProxyServer;
use controller_registry::AgentRegistry;
use controller_reports::{HttpReportExecutor, ReportDispatcher};
use controller_store::Stores;
use controller_workflow::{HttpScriptExecutor, WorkflowService};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::{Cli, Config};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	let config = Config::load(cli.config.as_deref(), cli.overrides())?;
	init_tracing(config.log_json);

	let stores = Stores::in_memory();
	seed_bootstrap(&stores, &config).await;

	let mailer: Arc<dyn Mailer> = match &config.smtp {
		Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
		None => Arc::new(LogMailer),
	};
	let notifier = Arc::new(Notifier::new(mailer));

	let auth = Arc::new(AuthResolver::new(
		stores.principal_directory.clone(),
		stores.execution_token_directory.clone(),
		config.default_role,
	));
	let registry = Arc::new(AgentRegistry::new(stores.clone(), Duration::from_secs(config.agent_stale_after_s)));
	let workflows = Arc::new(WorkflowService::new(
		stores.clone(),
		Arc::new(HttpScriptExecutor::new()),
		notifier.clone(),
	));
	let reports = Arc::new(ReportDispatcher::new(stores.clone(), Arc::new(HttpReportExecutor::new())));

	let app_state = AppState {
		auth,
		stores,
		registry,
		workflows,
		reports,
		notifier,
		default_role: config.default_role,
	};

	let (shutdown_trigger, shutdown_watcher) = new_shutdown();

	let mut proxy_handle = None;
	if let Some(proxy_config) = config.proxy.clone() {
		let proxy = ProxyServer::new(proxy_config)?;
		let proxy_shutdown = shutdown_watcher.clone();
		proxy_handle = Some(tokio::spawn(async move {
			if let Err(e) = proxy.run(proxy_shutdown).await {
				tracing::error!(error = %e, "front-door proxy exited with an error");
			}
		}));
	}

	let router = routes::router(app_state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive());

	let addr: std::net::SocketAddr = format!("{}:{}", config.api_host, config.api_port).parse()?;
	let listener = tokio::net::TcpListener::bind(addr).await?;
	tracing::info!(%addr, "controller API listening");

	axum::serve(listener, router)
		.with_graceful_shutdown(async move {
			shutdown_signal().await;
			shutdown_trigger.shutdown();
		})
		.await?;

	if let Some(handle) = proxy_handle {
		let _ = handle.await;
	}

	Ok(())
}

/// Pre-provisions the admin/agent tokens and environment grants an operator
/// lists in `Config` (§9 redesign note: read at startup rather than
/// generated, so a deployment's own secret manager stays authoritative).
async fn seed_bootstrap(stores: &Stores, config: &Config) {
	for token in &config.bootstrap_admin_tokens {
		stores.bearer_tokens.seed(&token.value, &token.token_name, Role::Admin).await;
	}
	for token in &config.bootstrap_agent_tokens {
		stores.bearer_tokens.seed(&token.value, &token.token_name, Role::Agent).await;
	}
	for grant in &config.bootstrap_grants {
		let Some(environment) = controller_store::models::EnvGrant::parse(&grant.environment) else {
			tracing::warn!(environment = %grant.environment, "ignoring bootstrap grant with unknown environment");
			continue;
		};
		stores.users.grant(&grant.user_id, environment, &grant.granted_by).await.ok();
	}
}

