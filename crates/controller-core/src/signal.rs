use std::future::Future;

use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

/// Resolves once the process receives SIGTERM or SIGINT.
pub async fn shutdown_signal() {
	let ctrl_c = async {
		tokio::signal::ctrl_c()
			.await
			.expect("failed to install SIGINT handler");
	};

	let terminate = async {
		match signal(SignalKind::terminate()) {
			Ok(mut sig) => {
				sig.recv().await;
			},
			Err(e) => {
				tracing::warn!(error = %e, "failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			},
		}
	};

	tokio::select! {
		_ = ctrl_c => info!("received SIGINT"),
		_ = terminate => info!("received SIGTERM"),
	}
}

/// A trigger that signals all [`ShutdownTrigger`] holders to begin shutting
/// down, and a means to wait until they have all acknowledged.
#[derive(Clone)]
pub struct ShutdownTrigger {
	tx: tokio::sync::watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ShutdownWatcher {
	rx: tokio::sync::watch::Receiver<bool>,
}

pub fn new_shutdown() -> (ShutdownTrigger, ShutdownWatcher) {
	let (tx, rx) = tokio::sync::watch::channel(false);
	(ShutdownTrigger { tx }, ShutdownWatcher { rx })
}

impl ShutdownTrigger {
	pub fn shutdown(&self) {
		let _ = self.tx.send(true);
	}
}

impl ShutdownWatcher {
	/// Resolves once [`ShutdownTrigger::shutdown`] has been called.
	pub async fn signaled(&mut self) {
		if *self.rx.borrow() {
			return;
		}
		let _ = self.rx.changed().await;
	}
}

/// Tracks in-flight work (connections, running report dispatches) so shutdown
/// can wait for them to drain instead of cutting them off mid-flight.
#[derive(Clone)]
pub struct DrainWatcher {
	inner: std::sync::Arc<tokio::sync::Semaphore>,
}

pub struct DrainGuard {
	_permit: tokio::sync::OwnedSemaphorePermit,
}

impl DrainWatcher {
	pub fn new() -> Self {
		Self {
			inner: std::sync::Arc::new(tokio::sync::Semaphore::new(usize::MAX >> 3)),
		}
	}

	/// Register one unit of in-flight work. Drop the guard when it completes.
	pub fn register(&self) -> DrainGuard {
		let permit = self
			.inner
			.clone()
			.try_acquire_owned()
			.expect("drain semaphore exhausted");
		DrainGuard { _permit: permit }
	}

	/// Waits until every outstanding [`DrainGuard`] has been dropped, or the
	/// timeout elapses, whichever comes first.
	pub async fn wait(&self, timeout: std::time::Duration) {
		let total = self.inner.available_permits();
		let acquire_all = self.inner.acquire_many(total as u32);
		if tokio::time::timeout(timeout, acquire_all).await.is_err() {
			tracing::warn!("drain timed out waiting for in-flight work");
		}
	}
}

impl Default for DrainWatcher {
	fn default() -> Self {
		Self::new()
	}
}

pub fn spawn_with_drain<F>(drain: DrainWatcher, fut: F)
where
	F: Future<Output = ()> + Send + 'static,
{
	tokio::spawn(async move {
		let _guard = drain.register();
		fut.await;
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn shutdown_watcher_observes_trigger() {
		let (trigger, mut watcher) = new_shutdown();
		trigger.shutdown();
		watcher.signaled().await;
	}

	#[tokio::test]
	async fn drain_wait_returns_once_guards_dropped() {
		let drain = DrainWatcher::new();
		let guard = drain.register();
		drop(guard);
		drain.wait(std::time::Duration::from_millis(100)).await;
	}
}
