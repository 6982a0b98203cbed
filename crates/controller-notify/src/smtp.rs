use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::NotifyError;
use crate::mailer::Mailer;

/// Loaded once from the deployment's `Config` file at startup (§9 redesign
/// note: no SMTP settings read from the environment at import time).
#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
	pub relay: String,
	pub port: u16,
	#[serde(default)]
	pub username: Option<String>,
	#[serde(default)]
	pub password: Option<SecretString>,
	pub from: String,
}

/// A real mail transport over `lettre`, used whenever `SmtpConfig` is
/// present in the loaded [`Config`](controller_core). Failures are
/// propagated to the caller as [`NotifyError`]; it is `Notifier`'s job
/// (§4.7) to catch and log them without failing the triggering state
/// transition.
pub struct SmtpMailer {
	transport: AsyncSmtpTransport<Tokio1Executor>,
	from: Mailbox,
}

impl SmtpMailer {
	pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
		let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.relay)?.port(config.port);
		if let (Some(user), Some(pass)) = (&config.username, &config.password) {
			builder = builder.credentials(Credentials::new(user.clone(), pass.expose_secret().to_string()));
		}
		Ok(Self {
			transport: builder.build(),
			from: config.from.parse()?,
		})
	}
}

#[async_trait]
impl Mailer for SmtpMailer {
	async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
		let to_mailbox: Mailbox = to
			.parse()
			.map_err(|_| NotifyError::InvalidAddress(to.to_string()))?;
		let message = Message::builder()
			.from(self.from.clone())
			.to(to_mailbox)
			.subject(subject)
			.body(body.to_string())
			.map_err(|e| NotifyError::Transport(e.to_string()))?;
		self
			.transport
			.send(message)
			.await
			.map(|_| ())
			.map_err(|e| NotifyError::Transport(e.to_string()))
	}
}
