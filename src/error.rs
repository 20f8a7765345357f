/// Errors surfaced by the facade's public API.
///
/// This is distinct from [`crate::StatusCategory`]: a status category
/// is data describing a server/transport response the loop routed on;
/// an `Error` here means the local plumbing (a channel, a task) is
/// gone.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("the subscription manager has been destroyed")]
	Destroyed,
	#[error("the message dispatcher task is no longer running")]
	DispatcherClosed,
	#[error("transport error: {0}")]
	Transport(#[from] crate::transport::TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
	fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
		Self::DispatcherClosed
	}
}
