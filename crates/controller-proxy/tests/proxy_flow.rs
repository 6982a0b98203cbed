//! Cross-module flow: TLS termination, client-cert identity extraction,
//! prefix routing, and identity-header injection through a real
//! `ProxyServer` against a stub plain-HTTP backend (SPEC_FULL.md §1 "Test
//! tooling": integration flows live under each crate's `tests/`).

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use controller_core::signal::new_shutdown;
use controller_proxy::config::{BackendConfig, IdentityHeaderNames, NativeAuthConfig, ProxyConfig, TlsConfig, VerifyClient};
use controller_proxy::server::ProxyServer;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
	fn verify_server_cert(
		&self,
		_end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp_response: &[u8],
		_now: UnixTime,
	) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
		Ok(rustls::client::danger::ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(
		&self,
		_message: &[u8],
		_cert: &CertificateDer<'_>,
		_dss: &rustls::DigitallySignedStruct,
	) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
	}

	fn verify_tls13_signature(
		&self,
		_message: &[u8],
		_cert: &CertificateDer<'_>,
		_dss: &rustls::DigitallySignedStruct,
	) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
		Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
	}

	fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
		rustls::crypto::ring::default_provider()
			.signature_verification_algorithms
			.supported_schemes()
	}
}

fn write_pem(contents: &str) -> tempfile::NamedTempFile {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	file.write_all(contents.as_bytes()).unwrap();
	file.flush().unwrap();
	file
}

/// Spawns a stub plain-HTTP backend that always replies `200 ok` and hands
/// back the raw request bytes it received, so the test can assert on the
/// identity headers the proxy injected.
async fn spawn_stub_backend() -> (u16, tokio::sync::oneshot::Receiver<Vec<u8>>) {
	let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
	let port = listener.local_addr().unwrap().port();
	let (tx, rx) = tokio::sync::oneshot::channel();
	tokio::spawn(async move {
		let (mut stream, _) = listener.accept().await.unwrap();
		let mut buf = vec![0u8; 8192];
		let n = stream.read(&mut buf).await.unwrap();
		buf.truncate(n);
		let _ = tx.send(buf);
		stream
			.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
			.await
			.unwrap();
	});
	(port, rx)
}

#[tokio::test]
async fn mandatory_client_cert_identity_is_forwarded_to_backend() {
	let server_cert = rcgen::generate_simple_self_signed(vec!["proxy.test".to_string()]).unwrap();
	let client_cert = rcgen::generate_simple_self_signed(vec!["jdoe.corp.example".to_string()]).unwrap();

	let server_cert_file = write_pem(&server_cert.cert.pem());
	let server_key_file = write_pem(&server_cert.key_pair.serialize_pem());
	// The client's own self-signed cert acts as its own trust anchor here,
	// since this test only exercises identity extraction, not a real PKI.
	let ca_file = write_pem(&client_cert.cert.pem());

	let (backend_port, backend_rx) = spawn_stub_backend().await;

	let mut backends = HashMap::new();
	backends.insert(
		"api".to_string(),
		BackendConfig {
			id: "api".to_string(),
			name: "api".to_string(),
			host: "127.0.0.1".to_string(),
			port: backend_port,
			path_prefix: "/api".to_string(),
			strip_prefix: false,
			websocket: false,
			timeout_s: 5,
			auth_required: true,
		},
	);

	let fixed_port = 18443u16;
	let config = ProxyConfig {
		listen_host: "127.0.0.1".to_string(),
		listen_port: fixed_port,
		tls: TlsConfig {
			cert_path: server_cert_file.path().to_str().unwrap().to_string(),
			key_path: server_key_file.path().to_str().unwrap().to_string(),
			ca_path: Some(ca_file.path().to_str().unwrap().to_string()),
			verify_client: VerifyClient::Required,
		},
		backends,
		default_backend: None,
		identity_headers: IdentityHeaderNames::default(),
		native_auth: NativeAuthConfig::default(),
		read_buffer: 65536,
	};

	let server = ProxyServer::new(config).unwrap();
	let (shutdown_trigger, shutdown_watcher) = new_shutdown();
	let server_task = tokio::spawn(async move {
		let _ = server.run(shutdown_watcher).await;
	});

	// Give the listener a moment to bind.
	tokio::time::sleep(std::time::Duration::from_millis(100)).await;

	let _ = rustls::crypto::ring::default_provider().install_default();
	let client_key_pem = client_cert.key_pair.serialize_pem();
	let client_cert_der = CertificateDer::from(client_cert.cert.der().to_vec());
	let client_key = rustls_pemfile::private_key(&mut client_key_pem.as_bytes())
		.unwrap()
		.unwrap();

	let client_tls_config = rustls::ClientConfig::builder()
		.dangerous()
		.with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
		.with_client_auth_cert(vec![client_cert_der], client_key)
		.unwrap();
	let connector = tokio_rustls::TlsConnector::from(Arc::new(client_tls_config));

	let tcp = TcpStream::connect(("127.0.0.1", fixed_port)).await.unwrap();
	let server_name = ServerName::try_from("proxy.test").unwrap();
	let mut tls = connector.connect(server_name, tcp).await.unwrap();

	tls
		.write_all(b"GET /api/agents HTTP/1.1\r\nHost: proxy.test\r\nConnection: close\r\n\r\n")
		.await
		.unwrap();

	let mut response = Vec::new();
	let _ = tls.read_to_end(&mut response).await;
	let response_text = String::from_utf8_lossy(&response);
	assert!(response_text.starts_with("HTTP/1.1 200"), "unexpected response: {response_text}");

	let forwarded = backend_rx.await.unwrap();
	let forwarded_text = String::from_utf8_lossy(&forwarded);
	assert!(
		forwarded_text.contains("X-Client-Cert-CN: jdoe.corp.example"),
		"backend did not receive the injected identity header: {forwarded_text}"
	);
	assert!(forwarded_text.contains("X-Auth-Method: smartcard"));

	shutdown_trigger.shutdown();
	let _ = tokio::time::timeout(std::time::Duration::from_secs(2), server_task).await;
}
