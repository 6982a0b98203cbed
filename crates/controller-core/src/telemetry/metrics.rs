use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter, exposed through the admin config
/// dump. This controller has no metrics-scrape surface in scope, so a
/// plain atomic stands in for a full registry (see DESIGN.md).
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
	pub fn inc(&self) {
		self.0.fetch_add(1, Ordering::Relaxed);
	}

	pub fn get(&self) -> u64 {
		self.0.load(Ordering::Relaxed)
	}
}

/// Process-wide counters for the controller's three subsystems.
#[derive(Clone, Default)]
pub struct Metrics {
	pub proxy_connections_total: Counter,
	pub proxy_connections_failed: Counter,
	pub workflow_created_total: Counter,
	pub workflow_executed_total: Counter,
	pub workflow_failed_total: Counter,
	pub report_runs_total: Counter,
	pub report_runs_failed: Counter,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counter_increments() {
		let c = Counter::default();
		c.inc();
		c.inc();
		assert_eq!(c.get(), 2);
	}
}
