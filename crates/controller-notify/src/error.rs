#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
	#[error("mail transport error: {0}")]
	Transport(String),
	#[error("invalid recipient address: {0}")]
	InvalidAddress(String),
}
