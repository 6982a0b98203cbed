use async_trait::async_trait;

use crate::error::NotifyError;

/// The pluggable mail transport a [`crate::Notifier`] hands rendered
/// subject/body pairs to. Rendering itself (HTML/text templates) is out of
/// scope per spec.md §1 — only this interface and the two implementations
/// this repo ships are specified.
#[async_trait]
pub trait Mailer: Send + Sync {
	async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Writes a structured log line instead of sending mail. Used in tests and
/// whenever no SMTP relay is configured, so the controller still runs with
/// notifications "best-effort, log-on-failure" per the Non-goals.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
	async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
		tracing::info!(to, subject, body, "notification (no SMTP relay configured)");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn log_mailer_never_fails() {
		let mailer = LogMailer;
		mailer.send("a@example.com", "subj", "body").await.unwrap();
	}
}
