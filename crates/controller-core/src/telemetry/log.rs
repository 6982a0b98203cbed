use std::time::Instant;

use serde_json::{Map, Value};
use tracing::info;

/// Accumulates structured fields over the lifetime of a request, workflow
/// transition, or report run, and emits exactly one `tracing` event when
/// dropped, rather than scattering `info!` calls through the call stack.
pub struct RequestLog {
	event: &'static str,
	start: Instant,
	fields: Map<String, Value>,
	emitted: bool,
}

impl RequestLog {
	pub fn new(event: &'static str) -> Self {
		Self {
			event,
			start: Instant::now(),
			fields: Map::new(),
			emitted: false,
		}
	}

	pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
		self.fields.insert(key.to_string(), value.into());
		self
	}

	/// Emit immediately instead of waiting for drop. Safe to call at most
	/// once; a later drop is then a no-op.
	pub fn emit_now(&mut self) {
		self.emit();
	}

	fn emit(&mut self) {
		if self.emitted {
			return;
		}
		self.emitted = true;
		let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
		info!(
			target: "access",
			event = self.event,
			duration_ms,
			fields = %Value::Object(std::mem::take(&mut self.fields)),
			"request complete"
		);
	}
}

impl Drop for RequestLog {
	fn drop(&mut self) {
		self.emit();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fields_survive_until_drop() {
		let mut log = RequestLog::new("test.event");
		log.set("agent", "a1").set("status", "ok");
		assert_eq!(log.fields.get("agent").unwrap(), "a1");
	}
}
