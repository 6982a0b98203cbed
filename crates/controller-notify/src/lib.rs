//! The best-effort email notifier (§4.7): renders a subject/body pair from
//! a closed [`NotificationEvent`] and hands off to a pluggable [`Mailer`].
//! Failures are logged and never propagated — notifications never fail the
//! state transition that triggered them (§7 propagation policy).

pub mod error;
pub mod event;
pub mod mailer;
pub mod smtp;

use std::sync::Arc;

pub use error::NotifyError;
pub use event::{AgentExitCode, NotificationEvent};
pub use mailer::{LogMailer, Mailer};
pub use smtp::{SmtpConfig, SmtpMailer};

pub struct Notifier {
	mailer: Arc<dyn Mailer>,
}

impl Notifier {
	pub fn new(mailer: Arc<dyn Mailer>) -> Self {
		Self { mailer }
	}

	/// Renders and sends exactly one notification per event (§4.5). Errors
	/// are logged via `tracing::error!` and swallowed.
	pub async fn notify(&self, event: NotificationEvent) {
		let to = event.recipient().to_string();
		let subject = event.subject();
		let body = event.body();
		let kind = event.kind();
		if let Err(err) = self.mailer.send(&to, &subject, &body).await {
			tracing::error!(event = kind, to, error = %err, "failed to send notification");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use parking_lot::Mutex;

	#[derive(Default)]
	struct FailingMailer {
		attempts: Mutex<u32>,
	}

	#[async_trait]
	impl Mailer for FailingMailer {
		async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
			*self.attempts.lock() += 1;
			Err(NotifyError::Transport("relay down".to_string()))
		}
	}

	#[tokio::test]
	async fn mailer_failure_is_swallowed() {
		let mailer = Arc::new(FailingMailer::default());
		let notifier = Notifier::new(mailer.clone());
		notifier
			.notify(NotificationEvent::WorkflowApproved {
				workflow_id: "wf1".to_string(),
				requestor_email: "alice@example.com".to_string(),
				approved_by: "bob".to_string(),
			})
			.await;
		assert_eq!(*mailer.attempts.lock(), 1);
	}
}
