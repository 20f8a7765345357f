//! The authoritative set of subscribed channels/groups, per-channel
//! state blobs, and the temporarily-unavailable sub-set.
//!
//! A plain struct with `BTreeMap`/`BTreeSet` fields and inherent
//! methods named after the operation they perform, mutated only by
//! its owner (the facade, under the facade lock).

use crate::misc::{presence_mirror, StateValue, Timetoken};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default, Clone)]
struct Entry {
	with_presence: bool,
	state: Option<StateValue>,
}

/// Request to add channels/groups to the registry.
///
/// `timetoken`, if set, is an explicit cursor the caller wants the
/// next long-poll to resume from; the registry itself ignores it --
/// only the facade's cursor policy consults it.
#[derive(Debug, Default, Clone)]
pub struct SubscribeOp {
	pub channels: Vec<String>,
	pub channel_groups: Vec<String>,
	pub with_presence: bool,
	pub state: Option<BTreeMap<String, StateValue>>,
	pub timetoken: Option<Timetoken>,
}

/// Request to remove channels/groups from the registry.
#[derive(Debug, Default, Clone)]
pub struct UnsubscribeOp {
	pub channels: Vec<String>,
	pub channel_groups: Vec<String>,
}

/// Request to toggle presence mirroring for already-subscribed
/// channels/groups.
#[derive(Debug, Default, Clone)]
pub struct PresenceOp {
	pub channels: Vec<String>,
	pub channel_groups: Vec<String>,
	pub connected: bool,
}

/// Request to set the opaque per-channel/group state blob.
#[derive(Debug, Default, Clone)]
pub struct StateOp {
	pub channels: Vec<String>,
	pub channel_groups: Vec<String>,
	pub state: StateValue,
}

/// Authoritative subscription state: subscribed channels/groups, their
/// presence-mirror and state settings, and the temporarily-unavailable
/// subset of each.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
	channels: BTreeMap<String, Entry>,
	channel_groups: BTreeMap<String, Entry>,
	temp_unavailable_channels: BTreeSet<String>,
	temp_unavailable_groups: BTreeSet<String>,
}

impl SubscriptionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Applies a subscribe operation. Returns `true` if the subscribed
	/// channel/group mix changed (new names were added).
	pub fn apply_subscribe(&mut self, op: SubscribeOp) -> bool {
		let mut changed = false;
		for channel in &op.channels {
			changed |= !self.channels.contains_key(channel);
			let entry = self.channels.entry(channel.clone()).or_default();
			entry.with_presence |= op.with_presence;
			if let Some(state) = op.state.as_ref().and_then(|s| s.get(channel)) {
				entry.state = Some(state.clone());
			}
		}
		for group in &op.channel_groups {
			changed |= !self.channel_groups.contains_key(group);
			let entry = self.channel_groups.entry(group.clone()).or_default();
			entry.with_presence |= op.with_presence;
			if let Some(state) = op.state.as_ref().and_then(|s| s.get(group)) {
				entry.state = Some(state.clone());
			}
		}
		changed
	}

	/// Applies an unsubscribe operation. Returns `true` if the
	/// subscribed channel/group mix changed.
	pub fn apply_unsubscribe(&mut self, op: UnsubscribeOp) -> bool {
		let mut changed = false;
		for channel in &op.channels {
			changed |= self.channels.remove(channel).is_some();
			self.temp_unavailable_channels.remove(channel);
		}
		for group in &op.channel_groups {
			changed |= self.channel_groups.remove(group).is_some();
			self.temp_unavailable_groups.remove(group);
		}
		changed
	}

	/// Applies a presence toggle to already-subscribed channels/groups.
	/// Does not add or remove subscriptions and never changes the mix.
	pub fn apply_presence(&mut self, op: PresenceOp) {
		for channel in &op.channels {
			if let Some(entry) = self.channels.get_mut(channel) {
				entry.with_presence = op.connected;
			}
		}
		for group in &op.channel_groups {
			if let Some(entry) = self.channel_groups.get_mut(group) {
				entry.with_presence = op.connected;
			}
		}
	}

	/// Applies a state blob to already-subscribed channels/groups.
	pub fn apply_state(&mut self, op: StateOp) {
		for channel in &op.channels {
			if let Some(entry) = self.channels.get_mut(channel) {
				entry.state = Some(op.state.clone());
			}
		}
		for group in &op.channel_groups {
			if let Some(entry) = self.channel_groups.get_mut(group) {
				entry.state = Some(op.state.clone());
			}
		}
	}

	pub fn is_empty(&self) -> bool {
		self.channels.is_empty() && self.channel_groups.is_empty()
	}

	/// `false` only when there is nothing subscribed at all; a
	/// registry holding only temporarily-unavailable entries is still
	/// "something to subscribe to" in principle -- see
	/// [`Self::subscribed_to_only_temporary_unavailable`] for the
	/// distinct "everything is currently blocked" signal.
	pub fn has_anything_to_subscribe(&self) -> bool {
		!self.is_empty()
	}

	/// `true` iff every subscribed channel and group is also in the
	/// temporarily-unavailable set -- the signal for the loop to sleep
	/// rather than issue a request that would have no effect.
	pub fn subscribed_to_only_temporary_unavailable(&self) -> bool {
		!self.is_empty()
			&& self
				.channels
				.keys()
				.all(|c| self.temp_unavailable_channels.contains(c))
			&& self
				.channel_groups
				.keys()
				.all(|g| self.temp_unavailable_groups.contains(g))
	}

	pub fn add_temporary_unavailable_channel(&mut self, channel: &str) {
		if self.channels.contains_key(channel) {
			self.temp_unavailable_channels.insert(channel.to_owned());
		}
	}

	pub fn add_temporary_unavailable_group(&mut self, group: &str) {
		if self.channel_groups.contains_key(group) {
			self.temp_unavailable_groups.insert(group.to_owned());
		}
	}

	pub fn remove_temporary_unavailable_channel(&mut self, channel: &str) {
		self.temp_unavailable_channels.remove(channel);
	}

	pub fn remove_temporary_unavailable_group(&mut self, group: &str) {
		self.temp_unavailable_groups.remove(group);
	}

	pub fn reset_temporary_unavailable(&mut self) {
		self.temp_unavailable_channels.clear();
		self.temp_unavailable_groups.clear();
	}

	/// Subscribed channels, plus their `"-pnpres"` mirrors where
	/// presence was requested, minus anything temporarily unavailable.
	pub fn effective_channels(&self) -> Vec<String> {
		self.channels
			.iter()
			.filter(|(name, _)| !self.temp_unavailable_channels.contains(*name))
			.flat_map(|(name, entry)| {
				let mut names = vec![name.clone()];
				if entry.with_presence {
					names.push(presence_mirror(name));
				}
				names
			})
			.collect()
	}

	pub fn effective_channel_groups(&self) -> Vec<String> {
		self.channel_groups
			.iter()
			.filter(|(name, _)| !self.temp_unavailable_groups.contains(*name))
			.flat_map(|(name, entry)| {
				let mut names = vec![name.clone()];
				if entry.with_presence {
					names.push(presence_mirror(name));
				}
				names
			})
			.collect()
	}

	/// Plain subscribed channel names (no presence mirrors), for
	/// presence/leave/heartbeat request listings.
	pub fn target_channels(&self, with_presence_only: bool) -> Vec<String> {
		self.channels
			.iter()
			.filter(|(_, entry)| !with_presence_only || entry.with_presence)
			.map(|(name, _)| name.clone())
			.collect()
	}

	pub fn target_groups(&self, with_presence_only: bool) -> Vec<String> {
		self.channel_groups
			.iter()
			.filter(|(_, entry)| !with_presence_only || entry.with_presence)
			.map(|(name, _)| name.clone())
			.collect()
	}

	/// A mapping from channel/group name to opaque state blob, for
	/// channels/groups that have one set; empty if none.
	pub fn create_state_payload(&self) -> BTreeMap<String, StateValue> {
		self.channels
			.iter()
			.chain(self.channel_groups.iter())
			.filter_map(|(name, entry)| entry.state.clone().map(|state| (name.clone(), state)))
			.collect()
	}
}
