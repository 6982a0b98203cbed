//! Parsing and framing for the native-auth (NTLM-like) challenge/response
//! handshake used by the front-door proxy when a client presents neither a
//! certificate nor a proxy session cookie. The handshake is three messages
//! exchanged across repeated `401 WWW-Authenticate: Negotiate` round trips
//! on the *same* TCP connection; this module only knows how to parse and
//! build the base64 payloads, the per-connection state machine itself lives
//! in the proxy crate since it needs the socket.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

const NEGOTIATE_PREFIX: &str = "Negotiate ";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum NativeAuthError {
	#[error("Authorization header is missing the Negotiate scheme")]
	MissingScheme,
	#[error("Negotiate payload is not valid base64")]
	InvalidBase64,
	#[error("message is too short to contain a native-auth signature")]
	TooShort,
	#[error("message signature did not match the expected magic bytes")]
	BadSignature,
	#[error("unexpected message type {0}, wanted {1}")]
	WrongMessageType(u32, u32),
}

const SIGNATURE: &[u8; 8] = b"NativeA\0";

/// message type 1: client -> proxy, "I'd like to authenticate".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiateMessage;

/// message type 2: proxy -> client, carries an opaque challenge nonce the
/// client's credential cache signs over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeMessage {
	pub nonce: [u8; 8],
}

/// message type 3: client -> proxy, the signed response plus the asserted
/// domain/user identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateMessage {
	pub domain: Option<String>,
	pub user: String,
	pub response: Vec<u8>,
}

/// Strips the `Negotiate ` scheme prefix from a `WWW-Authenticate` or
/// `Authorization` header value and base64-decodes the remainder.
pub fn decode_header_payload(value: &str) -> Result<Vec<u8>, NativeAuthError> {
	let rest = value
		.strip_prefix(NEGOTIATE_PREFIX)
		.ok_or(NativeAuthError::MissingScheme)?;
	BASE64
		.decode(rest.trim())
		.map_err(|_| NativeAuthError::InvalidBase64)
}

pub fn encode_header_payload(bytes: &[u8]) -> String {
	format!("{NEGOTIATE_PREFIX}{}", BASE64.encode(bytes))
}

fn parse_header(buf: &[u8]) -> Result<u32, NativeAuthError> {
	if buf.len() < 12 {
		return Err(NativeAuthError::TooShort);
	}
	if &buf[0..8] != SIGNATURE {
		return Err(NativeAuthError::BadSignature);
	}
	Ok(u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]))
}

pub fn parse_negotiate(buf: &[u8]) -> Result<NegotiateMessage, NativeAuthError> {
	let ty = parse_header(buf)?;
	if ty != 1 {
		return Err(NativeAuthError::WrongMessageType(ty, 1));
	}
	Ok(NegotiateMessage)
}

pub fn build_negotiate() -> Vec<u8> {
	let mut out = SIGNATURE.to_vec();
	out.extend_from_slice(&1u32.to_le_bytes());
	out
}

pub fn parse_challenge(buf: &[u8]) -> Result<ChallengeMessage, NativeAuthError> {
	let ty = parse_header(buf)?;
	if ty != 2 {
		return Err(NativeAuthError::WrongMessageType(ty, 2));
	}
	if buf.len() < 20 {
		return Err(NativeAuthError::TooShort);
	}
	let mut nonce = [0u8; 8];
	nonce.copy_from_slice(&buf[12..20]);
	Ok(ChallengeMessage { nonce })
}

pub fn build_challenge(nonce: [u8; 8]) -> Vec<u8> {
	let mut out = SIGNATURE.to_vec();
	out.extend_from_slice(&2u32.to_le_bytes());
	out.extend_from_slice(&nonce);
	out
}

pub fn parse_authenticate(buf: &[u8]) -> Result<AuthenticateMessage, NativeAuthError> {
	let ty = parse_header(buf)?;
	if ty != 3 {
		return Err(NativeAuthError::WrongMessageType(ty, 3));
	}
	let rest = &buf[12..];
	let text = String::from_utf8_lossy(rest);
	let mut parts = text.splitn(3, '\u{1}');
	let domain = parts.next().filter(|s| !s.is_empty()).map(|s| s.to_string());
	let user = parts.next().unwrap_or_default().to_string();
	let response = parts.next().unwrap_or_default().as_bytes().to_vec();
	Ok(AuthenticateMessage {
		domain,
		user,
		response,
	})
}

pub fn build_authenticate(domain: Option<&str>, user: &str, response: &[u8]) -> Vec<u8> {
	let mut out = SIGNATURE.to_vec();
	out.extend_from_slice(&3u32.to_le_bytes());
	out.extend_from_slice(domain.unwrap_or("").as_bytes());
	out.push(1);
	out.extend_from_slice(user.as_bytes());
	out.push(1);
	out.extend_from_slice(&String::from_utf8_lossy(response).as_bytes());
	out
}

/// Per-connection phase tracked by the proxy while a native-auth handshake
/// is in progress. The connection must not be closed between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NativeAuthPhase {
	#[default]
	NotStarted,
	ChallengeSent,
	Authenticated,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn negotiate_roundtrips() {
		let bytes = build_negotiate();
		assert_eq!(parse_negotiate(&bytes).unwrap(), NegotiateMessage);
	}

	#[test]
	fn challenge_roundtrips() {
		let nonce = [1, 2, 3, 4, 5, 6, 7, 8];
		let bytes = build_challenge(nonce);
		assert_eq!(parse_challenge(&bytes).unwrap().nonce, nonce);
	}

	#[test]
	fn authenticate_roundtrips_with_domain() {
		let bytes = build_authenticate(Some("CORP"), "jdoe", b"signed-blob");
		let msg = parse_authenticate(&bytes).unwrap();
		assert_eq!(msg.domain.as_deref(), Some("CORP"));
		assert_eq!(msg.user, "jdoe");
		assert_eq!(msg.response, b"signed-blob");
	}

	#[test]
	fn authenticate_roundtrips_without_domain() {
		let bytes = build_authenticate(None, "jdoe", b"blob");
		let msg = parse_authenticate(&bytes).unwrap();
		assert_eq!(msg.domain, None);
		assert_eq!(msg.user, "jdoe");
	}

	#[test]
	fn wrong_message_type_is_rejected() {
		let bytes = build_negotiate();
		assert_eq!(
			parse_challenge(&bytes).unwrap_err(),
			NativeAuthError::WrongMessageType(1, 2)
		);
	}

	#[test]
	fn header_payload_roundtrips_through_base64() {
		let bytes = build_negotiate();
		let header = encode_header_payload(&bytes);
		assert!(header.starts_with("Negotiate "));
		let decoded = decode_header_payload(&header).unwrap();
		assert_eq!(decoded, bytes);
	}

	#[test]
	fn missing_scheme_is_rejected() {
		assert_eq!(
			decode_header_payload("Basic abcd").unwrap_err(),
			NativeAuthError::MissingScheme
		);
	}
}
