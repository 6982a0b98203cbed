//! TLS termination and client-certificate identity extraction (§4.1 steps
//! 1, 3a). Builds the listener's `rustls::ServerConfig` from the configured
//! cert/key/ca bundle and turns an accepted peer certificate chain into a
//! Subject CN + canonical DN pair.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

use crate::config::{TlsConfig, VerifyClient};
use crate::error::ProxyError;

pub fn build_server_config(tls: &TlsConfig) -> Result<ServerConfig, ProxyError> {
	let cert_chain = load_certs(&tls.cert_path)?;
	let key = load_key(&tls.key_path)?;

	let builder = ServerConfig::builder();
	let config = match tls.verify_client {
		VerifyClient::None => builder.with_no_client_auth(),
		VerifyClient::Optional | VerifyClient::Required => {
			let ca_path = tls
				.ca_path
				.as_ref()
				.ok_or_else(|| ProxyError::Internal("verify_client requires a ca trust bundle".to_string()))?;
			let mut roots = RootCertStore::empty();
			for cert in load_certs(ca_path)? {
				roots
					.add(cert)
					.map_err(|e| ProxyError::Internal(format!("loading CA bundle {ca_path}: {e}")))?;
			}
			let mut verifier_builder = WebPkiClientVerifier::builder(Arc::new(roots));
			if tls.verify_client == VerifyClient::Optional {
				verifier_builder = verifier_builder.allow_unauthenticated();
			}
			let verifier = verifier_builder
				.build()
				.map_err(|e| ProxyError::Internal(format!("building client verifier: {e}")))?;
			builder.with_client_cert_verifier(verifier)
		},
	};

	let mut config = config
		.with_single_cert(cert_chain, key)
		.map_err(|e| ProxyError::Internal(format!("loading server cert/key: {e}")))?;
	config.alpn_protocols = vec![b"http/1.1".to_vec()];
	Ok(config)
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, ProxyError> {
	let file = File::open(path).map_err(|e| ProxyError::Internal(format!("reading {path}: {e}")))?;
	let mut reader = BufReader::new(file);
	rustls_pemfile::certs(&mut reader)
		.collect::<Result<Vec<_>, _>>()
		.map_err(|e| ProxyError::Internal(format!("parsing {path}: {e}")))
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, ProxyError> {
	let file = File::open(path).map_err(|e| ProxyError::Internal(format!("reading {path}: {e}")))?;
	let mut reader = BufReader::new(file);
	rustls_pemfile::private_key(&mut reader)
		.map_err(|e| ProxyError::Internal(format!("parsing {path}: {e}")))?
		.ok_or_else(|| ProxyError::Internal(format!("no private key found in {path}")))
}

/// Extracted from the peer certificate's Subject (§4.1 step 3a): the
/// Common Name plus a canonical DN string built by `x509-parser`'s
/// `Display` impl for `X509Name`.
#[derive(Clone)]
pub struct PeerCertIdentity {
	pub cn: String,
	pub dn: String,
}

pub fn extract_peer_identity(chain: &[CertificateDer<'_>]) -> Option<PeerCertIdentity> {
	let leaf = chain.first()?;
	let (_, cert) = x509_parser::parse_x509_certificate(leaf.as_ref()).ok()?;
	let subject = cert.subject();
	let cn = subject
		.iter_common_name()
		.next()
		.and_then(|attr| attr.as_str().ok())
		.unwrap_or_default()
		.to_string();
	Some(PeerCertIdentity {
		cn,
		dn: subject.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extract_identity_from_self_signed_cert() {
		let cert = rcgen::generate_simple_self_signed(vec!["jdoe.corp.example".to_string()]).unwrap();
		let der = CertificateDer::from(cert.cert.der().to_vec());
		let identity = extract_peer_identity(std::slice::from_ref(&der)).unwrap();
		assert_eq!(identity.cn, "jdoe.corp.example");
		assert!(identity.dn.contains("CN=jdoe.corp.example"));
	}

	#[test]
	fn empty_chain_yields_no_identity() {
		assert!(extract_peer_identity(&[]).is_none());
	}
}
