//! Fan-out of status and message events to user-registered listeners.
//!
//! Listeners are held behind an `ArcSwap` snapshot, so `announce` can
//! read one `Arc` and iterate it without holding a lock across user
//! callbacks -- listener mutation during dispatch never observes torn
//! state.

use crate::{message::Message, status::SubscribeStatus};
use arc_swap::ArcSwap;
use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};

/// Capability callbacks a registered listener can implement.
///
/// All methods default to a no-op; implementors override only the
/// events they care about.
pub trait Listener: Send + Sync {
	fn status(&self, _status: &SubscribeStatus) {}
	fn message(&self, _message: &Message) {}
	fn presence(&self, _message: &Message) {}
	fn signal(&self, _message: &Message) {}
	fn object(&self, _message: &Message) {}
	fn file(&self, _message: &Message) {}
}

struct Registered {
	id: u64,
	listener: Arc<dyn Listener>,
}

#[derive(Default)]
pub struct ListenerRegistry {
	listeners: ArcSwap<Vec<Registered>>,
	next_id: AtomicU64,
}

/// A token identifying a previously-registered listener, for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

impl ListenerRegistry {
	pub fn add(&self, listener: Arc<dyn Listener>) -> ListenerId {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		self.listeners.rcu(|current| {
			let mut next = (**current).clone_keep_arcs();
			next.push(Registered {
				id,
				listener: Arc::clone(&listener),
			});
			next
		});
		ListenerId(id)
	}

	pub fn remove(&self, id: ListenerId) {
		self.listeners.rcu(|current| {
			let mut next = (**current).clone_keep_arcs();
			next.retain(|entry| entry.id != id.0);
			next
		});
	}

	/// Dispatch a status to every registered listener, in registration
	/// order.
	pub fn announce_status(&self, status: &SubscribeStatus) {
		for entry in self.listeners.load().iter() {
			entry.listener.status(status);
		}
	}

	/// Dispatch a message to the listener callback matching its
	/// classification.
	pub fn announce_message(&self, message: &Message) {
		use crate::message::MessageType;
		for entry in self.listeners.load().iter() {
			match message.message_type {
				MessageType::Message => entry.listener.message(message),
				MessageType::Presence => entry.listener.presence(message),
				MessageType::Signal => entry.listener.signal(message),
				MessageType::Object => entry.listener.object(message),
				MessageType::File => entry.listener.file(message),
			}
		}
	}
}

// `Registered` holds an `Arc<dyn Listener>`; cloning the containing
// `Vec` only needs to clone the `Arc`s, not the listeners themselves.
trait CloneKeepArcs {
	fn clone_keep_arcs(&self) -> Self;
}

impl CloneKeepArcs for Vec<Registered> {
	fn clone_keep_arcs(&self) -> Self {
		self.iter()
			.map(|entry| Registered {
				id: entry.id,
				listener: Arc::clone(&entry.listener),
			})
			.collect()
	}
}
