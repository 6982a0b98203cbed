pub mod log;
pub mod metrics;

/// Installs the process-wide `tracing` subscriber. Call exactly once at
/// startup. Honors `RUST_LOG` via `EnvFilter`; falls back to `info` for the
/// controller's own crates and `warn` for dependencies.
pub fn init_tracing(json: bool) {
	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::fmt;
	use tracing_subscriber::layer::SubscriberExt;
	use tracing_subscriber::util::SubscriberInitExt;

	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new("info,controller=debug"));

	let registry = tracing_subscriber::registry().with(filter);

	if json {
		registry.with(fmt::layer().json().with_target(true)).init();
	} else {
		registry.with(fmt::layer().with_target(true)).init();
	}
}
