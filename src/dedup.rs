//! A bounded FIFO over recently seen message identities, used to
//! reject repeats delivered across overlapping long-polls.
//!
//! Pairs a `VecDeque` for eviction order with a `HashSet` for O(1)
//! containment.

use crate::message::{Message, MessageIdentity};
use std::collections::{HashSet, VecDeque};

#[derive(Debug)]
pub struct DuplicationFilter {
	capacity: usize,
	order: VecDeque<MessageIdentity>,
	seen: HashSet<MessageIdentity>,
}

impl DuplicationFilter {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			order: VecDeque::with_capacity(capacity),
			seen: HashSet::with_capacity(capacity),
		}
	}

	/// Returns `true` if `message`'s identity was already seen within
	/// the filter's capacity; records it either way.
	pub fn is_duplicate(&mut self, message: &Message) -> bool {
		if self.capacity == 0 {
			return false;
		}

		let identity = message.identity();
		if self.seen.contains(&identity) {
			return true;
		}

		if self.order.len() >= self.capacity {
			if let Some(oldest) = self.order.pop_front() {
				self.seen.remove(&oldest);
			}
		}
		self.order.push_back(identity.clone());
		self.seen.insert(identity);
		false
	}

	/// Clears all recorded identities. Called on every channel-mix
	/// change, since timetokens restart against the new mix.
	pub fn clear(&mut self) {
		self.order.clear();
		self.seen.clear();
	}
}
