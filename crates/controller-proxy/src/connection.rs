//! The per-connection request pipeline (§4.1 steps 1-6): route, authenticate,
//! rewrite, forward, and — for WebSocket routes — tunnel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::header::{AUTHORIZATION, COOKIE, SET_COOKIE, UPGRADE, WWW_AUTHENTICATE};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, copy_bidirectional};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use controller_auth::native::NativeAuthError;
use controller_auth::session::SessionId;
use controller_core::telemetry::log::RequestLog;

use crate::config::BackendConfig;
use crate::error::ProxyError;
use crate::identity::{RequestIdentity, rewrite_headers};
use crate::native_state::{NativeAuthState, NativeAuthStep};
use crate::router::rewrite_path;
use crate::server::ProxyState;
use crate::tls::{PeerCertIdentity, extract_peer_identity};

type ResponseBody = BoxBody<Bytes, hyper::Error>;

#[derive(Clone)]
struct ConnState {
	proxy: Arc<ProxyState>,
	peer_addr: SocketAddr,
	peer_cert_identity: Option<PeerCertIdentity>,
	native_auth: Arc<Mutex<NativeAuthState>>,
}

/// Accepts one TLS connection and serves HTTP/1.1 requests on it until the
/// client disconnects (§5: one Tokio task per connection). The peer
/// certificate, if any, is extracted once up front since it does not
/// change across requests on the same connection; the native-auth phase is
/// tracked per-connection because the handshake spans multiple requests.
pub async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, acceptor: TlsAcceptor, state: Arc<ProxyState>) {
	let tls_stream = match acceptor.accept(stream).await {
		Ok(s) => s,
		Err(e) => {
			tracing::warn!(peer = %peer_addr, error = %e, "tls handshake failed");
			return;
		},
	};

	let peer_cert_identity = {
		let (_, session) = tls_stream.get_ref();
		session.peer_certificates().and_then(extract_peer_identity)
	};

	let conn = ConnState {
		proxy: state,
		peer_addr,
		peer_cert_identity,
		native_auth: Arc::new(Mutex::new(NativeAuthState::default())),
	};

	let io = TokioIo::new(tls_stream);
	let service = service_fn(move |req| {
		let conn = conn.clone();
		async move { Ok::<_, std::convert::Infallible>(handle_request(req, conn).await) }
	});

	if let Err(e) = hyper::server::conn::http1::Builder::new()
		.serve_connection(io, service)
		.with_upgrades()
		.await
	{
		tracing::debug!(peer = %peer_addr, error = %e, "connection closed");
	}
}

async fn handle_request(req: Request<Incoming>, conn: ConnState) -> Response<ResponseBody> {
	let mut log = RequestLog::new("proxy.request");
	log.set("peer", conn.peer_addr.to_string());
	log.set("method", req.method().to_string());
	log.set("path", req.uri().path().to_string());

	let result = route_and_forward(req, &conn, &mut log).await;
	match result {
		Ok(resp) => {
			log.set("status", resp.status().as_u16() as i64);
			resp
		},
		Err(err) => {
			log.set("error", err.to_string());
			error_response(err)
		},
	}
}

async fn route_and_forward(
	req: Request<Incoming>,
	conn: &ConnState,
	log: &mut RequestLog,
) -> Result<Response<ResponseBody>, ProxyError> {
	let path = req.uri().path().to_string();
	let backend = conn
		.proxy
		.config
		.route(&path)
		.cloned()
		.ok_or_else(|| ProxyError::RouteNotFound(path.clone()))?;
	log.set("backend", backend.id.clone());

	let mut new_session_cookie = None;
	let identity = if backend.auth_required {
		match authenticate(&req, conn)? {
			(AuthOutcome::Identity(identity), cookie) => {
				new_session_cookie = cookie;
				identity
			},
			(AuthOutcome::Challenge(resp), _) => return Ok(resp),
		}
	} else {
		RequestIdentity::proxy_session("anonymous".to_string())
	};
	log.set("auth_method", identity.auth_method.clone());
	log.set("cn", identity.cn.clone());

	let is_websocket = backend.websocket
		&& req
			.headers()
			.get(UPGRADE)
			.and_then(|v| v.to_str().ok())
			.map(|v| v.eq_ignore_ascii_case("websocket"))
			.unwrap_or(false);

	let mut resp = if is_websocket {
		forward_websocket(req, &backend, &identity, conn).await?
	} else {
		forward_http(req, &backend, &identity, conn).await?
	};

	if let Some(session_id) = new_session_cookie {
		resp
			.headers_mut()
			.insert(SET_COOKIE, set_cookie_header(&session_id));
	}
	Ok(resp)
}

enum AuthOutcome {
	Identity(RequestIdentity),
	Challenge(Response<ResponseBody>),
}

/// §4.1 step 3: certificate, then session cookie, then native-auth, then
/// reject. Returns the established identity plus, if native-auth just
/// admitted a new caller, the session id the response must hand back as a
/// `Set-Cookie` so subsequent requests can use the cheaper cookie path.
fn authenticate(req: &Request<Incoming>, conn: &ConnState) -> Result<(AuthOutcome, Option<SessionId>), ProxyError> {
	if let Some(cert) = &conn.peer_cert_identity {
		return Ok((
			AuthOutcome::Identity(RequestIdentity::smartcard(
				cert.cn.clone(),
				cert.dn.clone(),
				conn.proxy.config.native_auth.domain.clone(),
			)),
			None,
		));
	}

	if let Some(session_id) = session_cookie(req) {
		if let Some(session) = conn.proxy.sessions.lookup_and_refresh(&session_id) {
			return Ok((AuthOutcome::Identity(RequestIdentity::proxy_session(session.user_id)), None));
		}
	}

	if conn.proxy.config.native_auth.enabled {
		let authorization = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
		let step = conn.native_auth.lock().advance(authorization);
		return match step {
			Ok(NativeAuthStep::Challenge(header_value)) => {
				Ok((AuthOutcome::Challenge(challenge_response(&header_value)), None))
			},
			Ok(NativeAuthStep::Admitted { user, domain }) => {
				let session = conn.proxy.sessions.create(
					user.clone(),
					conn.peer_addr.ip().to_string(),
					req
						.headers()
						.get(hyper::header::USER_AGENT)
						.and_then(|v| v.to_str().ok())
						.unwrap_or_default(),
				);
				Ok((
					AuthOutcome::Identity(RequestIdentity::native(
						user,
						domain.unwrap_or_else(|| conn.proxy.config.native_auth.domain.clone()),
					)),
					Some(session.session_id),
				))
			},
			Err(NativeAuthError::MissingScheme) | Err(NativeAuthError::InvalidBase64) => Err(ProxyError::Unauthorized),
			Err(e) => Err(ProxyError::NativeAuthParse(e)),
		};
	}

	Err(ProxyError::Unauthorized)
}

fn set_cookie_header(session_id: &SessionId) -> hyper::header::HeaderValue {
	hyper::header::HeaderValue::from_str(&format!("proxy_session={}; HttpOnly; Secure; Path=/", session_id.as_str()))
		.expect("session id is hex and always a valid header value")
}

fn session_cookie(req: &Request<Incoming>) -> Option<SessionId> {
	let cookie_header = req.headers().get(COOKIE)?.to_str().ok()?;
	cookie_header.split(';').find_map(|kv| {
		let (k, v) = kv.trim().split_once('=')?;
		(k == "proxy_session").then(|| SessionId::from(v))
	})
}

fn challenge_response(header_value: &str) -> Response<ResponseBody> {
	Response::builder()
		.status(StatusCode::UNAUTHORIZED)
		.header(WWW_AUTHENTICATE, header_value)
		.body(empty_body())
		.expect("static response is well-formed")
}

/// §4.1 steps 4 & 6: rewrite then forward a plain HTTP request, streaming
/// the backend's response body back without buffering it whole.
async fn forward_http(
	req: Request<Incoming>,
	backend: &BackendConfig,
	identity: &RequestIdentity,
	conn: &ConnState,
) -> Result<Response<ResponseBody>, ProxyError> {
	let (mut parts, body) = req.into_parts();
	let path = rewrite_path(parts.uri.path(), backend);
	let query = parts.uri.query().map(|q| format!("?{q}")).unwrap_or_default();
	let uri: hyper::Uri = format!("http://{}{path}{query}", backend.base_authority())
		.parse()
		.map_err(|e| ProxyError::Internal(format!("building backend uri: {e}")))?;
	parts.uri = uri;

	rewrite_headers(
		&mut parts.headers,
		&conn.proxy.config.identity_headers,
		identity,
		&conn.peer_addr.ip().to_string(),
		&backend.base_authority(),
		false,
	);

	let outbound = Request::from_parts(parts, body.boxed());

	let response = tokio::time::timeout(Duration::from_secs(backend.timeout_s), conn.proxy.client.request(outbound))
		.await
		.map_err(|_| ProxyError::BackendTimeout)?
		.map_err(|e| ProxyError::BackendUnreachable(e.to_string()))?;

	let (parts, body) = response.into_parts();
	Ok(Response::from_parts(parts, body.boxed()))
}

/// §4.1 step 5: forward a WebSocket upgrade by hand-rolling the HTTP/1.1
/// handshake to the backend, relaying its `101` verbatim, then tunneling
/// bytes bidirectionally until either side closes.
async fn forward_websocket(
	req: Request<Incoming>,
	backend: &BackendConfig,
	identity: &RequestIdentity,
	conn: &ConnState,
) -> Result<Response<ResponseBody>, ProxyError> {
	let mut backend_stream = tokio::time::timeout(
		Duration::from_secs(backend.timeout_s),
		TcpStream::connect((backend.host.as_str(), backend.port)),
	)
	.await
	.map_err(|_| ProxyError::BackendTimeout)?
	.map_err(|e| ProxyError::BackendUnreachable(e.to_string()))?;

	let (mut parts, _body) = req.into_parts();
	let path = rewrite_path(parts.uri.path(), backend);
	let query = parts.uri.query().map(|q| format!("?{q}")).unwrap_or_default();
	rewrite_headers(
		&mut parts.headers,
		&conn.proxy.config.identity_headers,
		identity,
		&conn.peer_addr.ip().to_string(),
		&backend.base_authority(),
		true,
	);

	let mut request_bytes = format!("{} {path}{query} HTTP/1.1\r\n", parts.method).into_bytes();
	for (name, value) in parts.headers.iter() {
		request_bytes.extend_from_slice(name.as_str().as_bytes());
		request_bytes.extend_from_slice(b": ");
		request_bytes.extend_from_slice(value.as_bytes());
		request_bytes.extend_from_slice(b"\r\n");
	}
	request_bytes.extend_from_slice(b"\r\n");
	backend_stream
		.write_all(&request_bytes)
		.await
		.map_err(|e| ProxyError::BackendUnreachable(e.to_string()))?;

	let (status, response_head) = read_response_head(&mut backend_stream)
		.await
		.map_err(|e| ProxyError::BackendUnreachable(e.to_string()))?;
	if status != StatusCode::SWITCHING_PROTOCOLS {
		return Ok(Response::builder()
			.status(status)
			.body(full_body(Bytes::from(response_head)))
			.expect("status copied from a parsed response"));
	}

	let upgrade_req = Request::from_parts(parts, Empty::<Bytes>::new());
	let on_upgrade = hyper::upgrade::on(upgrade_req);

	tokio::spawn(async move {
		match on_upgrade.await {
			Ok(upgraded) => {
				let mut client_io = TokioIo::new(upgraded);
				if let Err(e) = copy_bidirectional(&mut client_io, &mut backend_stream).await {
					tracing::debug!(error = %e, "websocket tunnel closed");
				}
			},
			Err(e) => tracing::warn!(error = %e, "client did not complete the upgrade"),
		}
	});

	Ok(Response::builder()
		.status(StatusCode::SWITCHING_PROTOCOLS)
		.header(UPGRADE, "websocket")
		.header(hyper::header::CONNECTION, "upgrade")
		.body(empty_body())
		.expect("static response is well-formed"))
}

/// Reads a backend's HTTP/1.x response up to (and including) the blank
/// line terminating its headers, returning the parsed status plus the raw
/// bytes read (used verbatim when the backend refuses the upgrade).
async fn read_response_head(stream: &mut TcpStream) -> std::io::Result<(StatusCode, Vec<u8>)> {
	let mut buf = Vec::with_capacity(1024);
	let mut byte = [0u8; 1];
	loop {
		stream.read_exact(&mut byte).await?;
		buf.push(byte[0]);
		if buf.len() >= 4 && &buf[buf.len() - 4..] == b"\r\n\r\n" {
			break;
		}
	}
	let text = String::from_utf8_lossy(&buf);
	let status_line = text.lines().next().unwrap_or_default();
	let code = status_line
		.split_whitespace()
		.nth(1)
		.and_then(|c| c.parse::<u16>().ok())
		.unwrap_or(502);
	let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY);
	Ok((status, buf))
}

fn empty_body() -> ResponseBody {
	Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

fn full_body(bytes: Bytes) -> ResponseBody {
	Full::new(bytes).map_err(|never| match never {}).boxed()
}

fn error_response(err: ProxyError) -> Response<ResponseBody> {
	let status = err.status_code();
	let body = serde_json::json!({ "detail": err.to_string() }).to_string();
	Response::builder()
		.status(status)
		.header(hyper::header::CONTENT_TYPE, "application/json")
		.body(full_body(Bytes::from(body)))
		.unwrap_or_else(|_| Response::new(empty_body()))
}
