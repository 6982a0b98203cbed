use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngCore;

/// An opaque, unguessable session identifier (sent to the client as the
/// `proxy_session` cookie value).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
	pub fn generate() -> Self {
		let mut bytes = [0u8; 32];
		rand::thread_rng().fill_bytes(&mut bytes);
		Self(hex::encode(bytes))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&str> for SessionId {
	fn from(s: &str) -> Self {
		Self(s.to_string())
	}
}

#[derive(Clone, Debug)]
pub struct Session {
	pub session_id: SessionId,
	pub user_id: String,
	pub ip: String,
	pub user_agent: String,
	pub expires_at: DateTime<Utc>,
}

impl Session {
	fn is_expired(&self, now: DateTime<Utc>) -> bool {
		now > self.expires_at
	}
}

/// In-process sliding-TTL session store (§4.1, §5: "Session store may be
/// in-memory; lookup and refresh must be atomic with respect to expiry").
///
/// A single `Mutex` critical section per operation gives us that atomicity
/// for free: there is no window between "check expiry" and "refresh" where
/// another task can observe a stale or half-refreshed session.
pub struct SessionStore {
	sessions: Mutex<HashMap<SessionId, Session>>,
	ttl: Duration,
}

impl SessionStore {
	pub fn new(ttl: Duration) -> Self {
		Self {
			sessions: Mutex::new(HashMap::new()),
			ttl,
		}
	}

	pub fn create(&self, user_id: impl Into<String>, ip: impl Into<String>, user_agent: impl Into<String>) -> Session {
		let session = Session {
			session_id: SessionId::generate(),
			user_id: user_id.into(),
			ip: ip.into(),
			user_agent: user_agent.into(),
			expires_at: Utc::now() + self.ttl,
		};
		self.sessions
			.lock()
			.insert(session.session_id.clone(), session.clone());
		session
	}

	/// Looks up a session by id. If found and not expired, refreshes its
	/// `expires_at` ("sliding expiration") and returns the updated copy. If
	/// expired, removes it and returns `None`.
	pub fn lookup_and_refresh(&self, id: &SessionId) -> Option<Session> {
		let now = Utc::now();
		let mut sessions = self.sessions.lock();
		let expired = match sessions.get(id) {
			Some(s) => s.is_expired(now),
			None => return None,
		};
		if expired {
			sessions.remove(id);
			return None;
		}
		let session = sessions.get_mut(id).expect("checked above");
		session.expires_at = now + self.ttl;
		Some(session.clone())
	}

	pub fn destroy(&self, id: &SessionId) {
		self.sessions.lock().remove(id);
	}

	pub fn len(&self) -> usize {
		self.sessions.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn refresh_strictly_increases_expiry() {
		let store = SessionStore::new(Duration::from_secs(60));
		let session = store.create("u1", "127.0.0.1", "test-agent");
		let first_expiry = session.expires_at;

		std::thread::sleep(std::time::Duration::from_millis(5));
		let refreshed = store.lookup_and_refresh(&session.session_id).unwrap();
		assert!(refreshed.expires_at > first_expiry);
	}

	#[test]
	fn expired_session_is_not_returned_and_is_evicted() {
		let store = SessionStore::new(Duration::from_millis(1));
		let session = store.create("u1", "127.0.0.1", "test-agent");
		std::thread::sleep(std::time::Duration::from_millis(20));
		assert!(store.lookup_and_refresh(&session.session_id).is_none());
		assert!(store.is_empty());
	}

	#[test]
	fn unknown_session_returns_none() {
		let store = SessionStore::new(Duration::from_secs(60));
		assert!(store.lookup_and_refresh(&SessionId::from("nope")).is_none());
	}
}
