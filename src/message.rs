//! Raw messages handed off from a successful subscribe response to the
//! [`crate::dispatch`] queue.

use crate::misc::{StateValue, Timetoken};
use std::hash::{Hash, Hasher};

/// The classification the dispatcher uses to route a message to the
/// matching listener callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
	Message,
	Signal,
	Presence,
	Object,
	File,
}

/// A single entry from a subscribe envelope.
#[derive(Clone, Debug)]
pub struct Message {
	pub channel: String,
	/// The channel group or wildcard channel this message actually
	/// arrived on, if it differs from `channel`.
	pub subscription: Option<String>,
	pub message_type: MessageType,
	pub payload: StateValue,
	pub publish_timetoken: Timetoken,
	pub publish_region: Option<String>,
}

/// The identity used by the duplication filter: a message is a repeat
/// if another message with the same `(channel, timetoken, payload)`
/// was seen within the filter's capacity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageIdentity {
	channel: String,
	publish_timetoken: Timetoken,
	payload_hash: u64,
}

impl Message {
	pub fn identity(&self) -> MessageIdentity {
		let mut hasher = std::collections::hash_map::DefaultHasher::new();
		// `serde_json::Value` doesn't implement `Hash`; hash its
		// canonical string form instead.
		self.payload.to_string().hash(&mut hasher);
		MessageIdentity {
			channel: self.channel.clone(),
			publish_timetoken: self.publish_timetoken,
			payload_hash: hasher.finish(),
		}
	}
}
