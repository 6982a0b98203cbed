//! The front-door proxy's accept loop (§4.1, §5 "one task per connection").
//! A raw `hyper`/`tokio-rustls` listener, not an axum `Router` — axum is
//! reserved for the backend API surfaces the proxy forwards *to*
//! (SPEC_FULL.md §4.1 grounding note).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use controller_auth::session::SessionStore;
use controller_core::signal::{DrainWatcher, ShutdownWatcher, spawn_with_drain};

use crate::config::ProxyConfig;
use crate::connection::handle_connection;
use crate::error::ProxyError;
use crate::tls::build_server_config;

pub type HttpClient = Client<HttpConnector, http_body_util::combinators::BoxBody<bytes::Bytes, hyper::Error>>;

/// Shared, immutable-after-construction state every connection task reads
/// from: static config alongside the runtime collaborators (session store,
/// HTTP client) each connection needs.
pub struct ProxyState {
	pub config: Arc<ProxyConfig>,
	pub sessions: Arc<SessionStore>,
	pub client: HttpClient,
}

pub struct ProxyServer {
	config: Arc<ProxyConfig>,
	tls_acceptor: TlsAcceptor,
	state: Arc<ProxyState>,
}

impl ProxyServer {
	pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
		// rustls requires a process-wide default crypto provider; idempotent,
		// since a second caller (e.g. a test that also builds a rustls client)
		// may have already installed one.
		let _ = rustls::crypto::ring::default_provider().install_default();
		let tls_config = build_server_config(&config.tls)?;
		let session_ttl = Duration::from_secs(config.native_auth.session_timeout_s.max(1));
		let config = Arc::new(config);
		let state = Arc::new(ProxyState {
			config: config.clone(),
			sessions: Arc::new(SessionStore::new(session_ttl)),
			client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
		});
		Ok(Self {
			config,
			tls_acceptor: TlsAcceptor::from(Arc::new(tls_config)),
			state,
		})
	}

	pub fn local_state(&self) -> Arc<ProxyState> {
		self.state.clone()
	}

	/// Accepts connections until `shutdown` fires, then waits (bounded) for
	/// in-flight connections to drain before returning (§5 graceful
	/// shutdown, same `DrainWatcher` idiom as `controller-core::signal`).
	pub async fn run(&self, mut shutdown: ShutdownWatcher) -> Result<(), ProxyError> {
		let addr: SocketAddr = format!("{}:{}", self.config.listen_host, self.config.listen_port)
			.parse()
			.map_err(|e| ProxyError::Internal(format!("invalid listen address: {e}")))?;
		let listener = TcpListener::bind(addr)
			.await
			.map_err(|e| ProxyError::Internal(format!("binding {addr}: {e}")))?;
		tracing::info!(%addr, "front-door proxy listening");

		let drain = DrainWatcher::new();
		loop {
			tokio::select! {
				_ = shutdown.signaled() => {
					tracing::info!("proxy shutting down, draining connections");
					drain.wait(Duration::from_secs(30)).await;
					return Ok(());
				}
				accepted = listener.accept() => {
					let (stream, peer_addr) = match accepted {
						Ok(pair) => pair,
						Err(e) => {
							tracing::warn!(error = %e, "accept failed");
							continue;
						}
					};
					let acceptor = self.tls_acceptor.clone();
					let state = self.state.clone();
					spawn_with_drain(drain.clone(), async move {
						handle_connection(stream, peer_addr, acceptor, state).await;
					});
				}
			}
		}
	}
}
