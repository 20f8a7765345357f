//! Periodic presence heartbeats.
//!
//! A `tokio::time::interval` loop fires immediately on registration
//! and then on every tick thereafter, heartbeating the channels and
//! channel groups currently tracked by the subscription registry.
//! Restarting the timer always cancels any previously running one
//! first, so at most one heartbeat loop runs at a time.

use crate::{
	registry::SubscriptionRegistry,
	status::{Operation, StatusCategory, SubscribeStatus},
	transport::{HeartbeatRequest, HeartbeatTransport},
};
use std::{
	sync::{Arc, Mutex},
	time::Duration,
};
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeartbeatNotificationOptions {
	None,
	#[default]
	Failures,
	All,
}

/// Extra channels/groups heartbeated even though they carry no active
/// subscription (e.g. presence-only membership).
#[derive(Clone, Debug, Default)]
pub struct HeartbeatOnly {
	pub channels: Vec<String>,
	pub channel_groups: Vec<String>,
}

pub struct HeartbeatScheduler {
	interval: Duration,
	verbosity: HeartbeatNotificationOptions,
	transport: Arc<dyn HeartbeatTransport>,
	registry: Arc<Mutex<SubscriptionRegistry>>,
	listeners: Arc<crate::listener::ListenerRegistry>,
	heartbeat_only: Arc<Mutex<HeartbeatOnly>>,
	loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatScheduler {
	pub fn new(
		interval: Duration,
		verbosity: HeartbeatNotificationOptions,
		transport: Arc<dyn HeartbeatTransport>,
		registry: Arc<Mutex<SubscriptionRegistry>>,
		listeners: Arc<crate::listener::ListenerRegistry>,
	) -> Self {
		Self {
			interval,
			verbosity,
			transport,
			registry,
			listeners,
			heartbeat_only: Arc::new(Mutex::new(HeartbeatOnly::default())),
			loop_handle: Mutex::new(None),
		}
	}

	pub fn set_heartbeat_only(&self, set: HeartbeatOnly) {
		*self.heartbeat_only.lock().unwrap() = set;
	}

	/// (Re)starts the heartbeat timer. Any previously running timer is
	/// stopped first, matching the at-most-one-outstanding-heartbeat
	/// invariant for the scheduling loop itself.
	pub fn register_heartbeat_timer(self: &Arc<Self>) {
		self.stop();

		if self.interval.is_zero() {
			return;
		}

		let this = Arc::clone(self);
		let handle = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(this.interval);
			loop {
				ticker.tick().await;
				if let Err(err) = this.fire().await {
					tracing::debug!(%err, "heartbeat failed, stopping scheduler");
					break;
				}
			}
		});

		*self.loop_handle.lock().unwrap() = Some(handle);
	}

	/// Stops the timer and cancels any outstanding heartbeat call.
	/// Cancellation is silent -- no status is announced.
	pub fn stop(&self) {
		if let Some(handle) = self.loop_handle.lock().unwrap().take() {
			handle.abort();
		}
	}

	async fn fire(&self) -> crate::Result<()> {
		let (channels, channel_groups, state) = {
			let registry = self.registry.lock().unwrap();
			let heartbeat_only = self.heartbeat_only.lock().unwrap();
			let mut channels = registry.target_channels(false);
			channels.extend(heartbeat_only.channels.iter().cloned());
			channels.sort();
			channels.dedup();

			let mut channel_groups = registry.target_groups(false);
			channel_groups.extend(heartbeat_only.channel_groups.iter().cloned());
			channel_groups.sort();
			channel_groups.dedup();

			(channels, channel_groups, registry.create_state_payload())
		};

		if channels.is_empty() && channel_groups.is_empty() {
			return Ok(());
		}

		let request = HeartbeatRequest {
			channels: channels.clone(),
			channel_groups: channel_groups.clone(),
			state,
		};

		let result = self.transport.heartbeat(request).await;

		match (&result, self.verbosity) {
			(Ok(()), HeartbeatNotificationOptions::All) => {
				self.listeners.announce_status(&success_status(
					channels,
					channel_groups,
				));
			}
			(Err(_), HeartbeatNotificationOptions::All)
			| (Err(_), HeartbeatNotificationOptions::Failures) => {
				self.listeners.announce_status(&failure_status(
					channels,
					channel_groups,
				));
			}
			_ => {}
		}

		result.map_err(crate::Error::from)
	}
}

fn success_status(channels: Vec<String>, channel_groups: Vec<String>) -> SubscribeStatus {
	SubscribeStatus {
		category: StatusCategory::Acknowledgment,
		error: false,
		status_code: 200,
		auth_key: None,
		operation: Operation::Heartbeat,
		affected_channels: channels,
		affected_channel_groups: channel_groups,
		client_request: None,
		origin: None,
		tls_enabled: false,
	}
}

fn failure_status(channels: Vec<String>, channel_groups: Vec<String>) -> SubscribeStatus {
	SubscribeStatus {
		category: StatusCategory::BadRequest,
		error: true,
		status_code: 0,
		auth_key: None,
		operation: Operation::Heartbeat,
		affected_channels: channels,
		affected_channel_groups: channel_groups,
		client_request: None,
		origin: None,
		tls_enabled: false,
	}
}
