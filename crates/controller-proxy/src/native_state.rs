//! Per-connection native-auth state machine (§4.1 step 3c, REDESIGN FLAGS
//! §9: "model native-auth as an explicit per-connection enum, not headers
//! reconstructed from a stateless lookup"). One instance lives on the
//! connection task for as long as the TCP connection is open, since the
//! three-message handshake must survive two `401` round trips on the same
//! socket.

use rand::RngCore;

use controller_auth::native::{self, NativeAuthError};

#[derive(Debug, Clone, Default)]
pub enum NativeAuthState {
	#[default]
	AwaitingType1,
	AwaitingType3 {
		server_challenge: [u8; 8],
	},
	Authenticated {
		user: String,
		domain: Option<String>,
	},
}

pub enum NativeAuthStep {
	/// No proof yet, or the handshake needs another round trip: send `401`
	/// with this `WWW-Authenticate` value and keep the connection open.
	Challenge(String),
	/// Handshake complete; admit the asserted identity.
	Admitted { user: String, domain: Option<String> },
}

impl NativeAuthState {
	/// Advances the handshake given the inbound `Authorization` header, if
	/// any. Consumes and replaces `self` with the next phase.
	pub fn advance(&mut self, authorization: Option<&str>) -> Result<NativeAuthStep, NativeAuthError> {
		if let NativeAuthState::Authenticated { user, domain } = self {
			return Ok(NativeAuthStep::Admitted {
				user: user.clone(),
				domain: domain.clone(),
			});
		}
		let Some(header) = authorization else {
			*self = NativeAuthState::AwaitingType1;
			return Ok(NativeAuthStep::Challenge("Negotiate".to_string()));
		};

		let phase = std::mem::take(self);
		match phase {
			NativeAuthState::AwaitingType1 => {
				let payload = native::decode_header_payload(header)?;
				native::parse_negotiate(&payload)?;
				let mut nonce = [0u8; 8];
				rand::thread_rng().fill_bytes(&mut nonce);
				*self = NativeAuthState::AwaitingType3 { server_challenge: nonce };
				let challenge = native::build_challenge(nonce);
				Ok(NativeAuthStep::Challenge(native::encode_header_payload(&challenge)))
			},
			NativeAuthState::AwaitingType3 { .. } => {
				let payload = native::decode_header_payload(header)?;
				let msg = native::parse_authenticate(&payload)?;
				*self = NativeAuthState::Authenticated {
					user: msg.user.clone(),
					domain: msg.domain.clone(),
				};
				Ok(NativeAuthStep::Admitted {
					user: msg.user,
					domain: msg.domain,
				})
			},
			NativeAuthState::Authenticated { .. } => unreachable!("handled above"),
		}
	}
}
