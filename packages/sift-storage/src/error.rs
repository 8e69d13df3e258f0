#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Remote engine unreachable: {0}")]
	Transport(#[source] reqwest::Error),
	#[error("Remote engine returned status {status}: {body}")]
	Status { status: u16, body: String },
	#[error("Failed to decode {what}: {message}")]
	Decode { what: &'static str, message: String },
}
impl Error {
	/// True when the remote engine could not be reached or failed on its side, as opposed
	/// to rejecting the query it was given.
	pub fn is_unavailable(&self) -> bool {
		match self {
			Self::Transport(_) => true,
			Self::Status { status, .. } => *status >= 500,
			_ => false,
		}
	}
}
