//! Bounded hand-off from subscribe responses to the listener fan-out.
//!
//! A `tokio::mpsc` channel carries decoded messages out of the
//! subscribe loop to a dedicated background task, which applies
//! deduplication and then fans each message out to listeners --
//! keeping listener callbacks off the subscribe loop's own stack.

use crate::{dedup::DuplicationFilter, listener::ListenerRegistry, message::Message};
use std::sync::{Arc, Mutex};
use tokio::{sync::mpsc, task::JoinHandle};

pub type MessageTx = mpsc::UnboundedSender<Message>;
pub type MessageRx = mpsc::UnboundedReceiver<Message>;

pub fn channel() -> (MessageTx, MessageRx) {
	mpsc::unbounded_channel()
}

/// Owns the background task draining the message queue.
pub struct Dispatcher {
	handle: JoinHandle<()>,
}

impl Dispatcher {
	/// Spawns the dispatcher task. It applies the duplication filter
	/// to each message, then routes it to the matching listener
	/// callback, until the queue is closed or it is force-stopped.
	pub fn spawn(
		mut rx: MessageRx,
		dedup: Arc<Mutex<DuplicationFilter>>,
		listeners: Arc<ListenerRegistry>,
	) -> Self {
		let handle = tokio::spawn(async move {
			while let Some(message) = rx.recv().await {
				let is_duplicate = dedup.lock().unwrap().is_duplicate(&message);
				if is_duplicate {
					tracing::trace!(channel = %message.channel, "dropped duplicate message");
					continue;
				}
				listeners.announce_message(&message);
			}
			tracing::debug!("dispatcher queue closed, exiting");
		});

		Self { handle }
	}

	/// Terminates the dispatcher. `force = true` aborts the task
	/// immediately; `force = false` lets it drain whatever is already
	/// queued -- the caller must have dropped the sender half first, or
	/// this never returns, since the loop only exits when `rx.recv()`
	/// sees the channel close.
	pub async fn stop(self, force: bool) -> crate::Result<()> {
		if force {
			self.handle.abort();
		}
		match self.handle.await {
			Ok(()) => Ok(()),
			Err(err) if err.is_cancelled() => Ok(()),
			Err(_) => Err(crate::Error::DispatcherClosed),
		}
	}
}
