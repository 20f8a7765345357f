//! The public facade: wires the registry, dispatcher, listener
//! registry, heartbeat scheduler, and reconnection machinery together,
//! and owns the subscribe loop's task handle.

use crate::{
	dedup::DuplicationFilter,
	dispatch::{self, Dispatcher, MessageTx},
	heartbeat::{HeartbeatNotificationOptions, HeartbeatScheduler},
	listener::{Listener, ListenerId, ListenerRegistry},
	misc::Timetoken,
	reconnection::{
		DelayedReconnection, ReconnectionController, ReconnectionListener, ReconnectionOutcome,
		ReconnectionPolicy,
	},
	registry::{PresenceOp, StateOp, SubscribeOp, SubscriptionRegistry, UnsubscribeOp},
	status::{Operation, StatusCategory, SubscribeStatus},
	subscribe_loop,
	transport::{
		HeartbeatTransport, LeaveOutcome, LeaveRequest, LeaveTransport, ProbeTransport,
		SubscribeTransport,
	},
};
use std::{
	sync::{Arc, Mutex, OnceLock, Weak},
	time::Duration,
};
use tokio::task::JoinHandle;

/// Construction-time configuration for a [`SubscriptionManager`].
///
/// Loading this from a file or environment variables is out of scope;
/// callers build it directly or start from [`Configuration::default`].
#[derive(Clone, Debug)]
pub struct Configuration {
	/// `0` disables the heartbeat scheduler entirely.
	pub heartbeat_interval: Duration,
	pub heartbeat_notification_options: HeartbeatNotificationOptions,
	pub request_message_count_threshold: Option<usize>,
	pub filter_expression: Option<String>,
	pub suppress_leave_events: bool,
	/// Whether to launch the background dispatcher task at construction.
	pub start_subscriber_thread: bool,
	pub reconnection_policy: ReconnectionPolicy,
	pub max_reconnection_attempts: Option<u32>,
	pub reconnection_min_delay: Duration,
	pub reconnection_max_delay: Duration,
	pub delayed_reconnection_interval: Duration,
	pub duplication_filter_capacity: usize,
}

impl Default for Configuration {
	fn default() -> Self {
		Self {
			heartbeat_interval: Duration::from_secs(0),
			heartbeat_notification_options: HeartbeatNotificationOptions::default(),
			request_message_count_threshold: None,
			filter_expression: None,
			suppress_leave_events: false,
			start_subscriber_thread: true,
			reconnection_policy: ReconnectionPolicy::default(),
			max_reconnection_attempts: Some(10),
			reconnection_min_delay: Duration::from_secs(1),
			reconnection_max_delay: Duration::from_secs(30),
			delayed_reconnection_interval: Duration::from_secs(2),
			duplication_filter_capacity: 100,
		}
	}
}

/// Loop-owned cursor fields, guarded separately from the registry.
/// Accessed only under this lock, or from within a response handler
/// that has just acquired it.
pub(crate) struct FacadeState {
	pub(crate) connected: bool,
	pub(crate) timetoken: Timetoken,
	pub(crate) stored_timetoken: Option<Timetoken>,
	pub(crate) region: Option<String>,
	pub(crate) subscription_status_announced: bool,
}

impl Default for FacadeState {
	fn default() -> Self {
		Self {
			connected: false,
			timetoken: Timetoken::ZERO,
			stored_timetoken: None,
			region: None,
			subscription_status_announced: false,
		}
	}
}

/// Everything the subscribe loop needs, bundled so it can be handed to
/// a spawned task as a single `Arc`. Not exposed outside the crate.
///
/// `registry` is its own lock, separate from `facade`, so the
/// heartbeat scheduler can read it without taking the facade lock;
/// when the loop needs both it takes `facade` first, `registry`
/// second.
pub(crate) struct LoopContext {
	pub(crate) facade: Mutex<FacadeState>,
	pub(crate) registry: Arc<Mutex<SubscriptionRegistry>>,
	pub(crate) dedup: Arc<Mutex<DuplicationFilter>>,
	/// `None` once `destroy()` has dropped it to close the dispatcher's
	/// channel -- a message that arrives after that point is silently
	/// discarded rather than queued.
	pub(crate) message_tx: Mutex<Option<MessageTx>>,
	pub(crate) listeners: Arc<ListenerRegistry>,
	pub(crate) subscribe_transport: Arc<dyn SubscribeTransport>,
	pub(crate) heartbeat: Arc<HeartbeatScheduler>,
	pub(crate) reconnection: Arc<ReconnectionController>,
	pub(crate) delayed: DelayedReconnection,
	pub(crate) config: Configuration,
	pub(crate) loop_handle: Mutex<Option<JoinHandle<()>>>,
	self_weak: OnceLock<Weak<LoopContext>>,
}

impl LoopContext {
	fn self_arc(&self) -> Option<Arc<LoopContext>> {
		self.self_weak.get().and_then(Weak::upgrade)
	}

	pub(crate) fn restart_loop(self: &Arc<Self>) {
		self.delayed.cancel();
		let handle = subscribe_loop::spawn(Arc::clone(self));
		if let Some(previous) = self.loop_handle.lock().unwrap().replace(handle) {
			previous.abort();
		}
	}
}

#[async_trait::async_trait]
impl ReconnectionListener for LoopContext {
	async fn on_outcome(&self, outcome: ReconnectionOutcome) {
		let Some(this) = self.self_arc() else { return };
		match outcome {
			ReconnectionOutcome::Reconnected => {
				this.listeners
					.announce_status(&reconnection_status(StatusCategory::Reconnected, false));
				this.facade.lock().unwrap().connected = true;
				this.restart_loop();
				this.heartbeat.register_heartbeat_timer();
			}
			ReconnectionOutcome::Exhausted => {
				this.listeners.announce_status(&reconnection_status(
					StatusCategory::ReconnectionAttemptsExhausted,
					true,
				));
			}
		}
	}
}

fn reconnection_status(category: StatusCategory, error: bool) -> SubscribeStatus {
	SubscribeStatus {
		category,
		error,
		status_code: 0,
		auth_key: None,
		operation: Operation::Reconnection,
		affected_channels: vec![],
		affected_channel_groups: vec![],
		client_request: None,
		origin: None,
		tls_enabled: false,
	}
}

fn leave_failure_status() -> SubscribeStatus {
	SubscribeStatus {
		category: StatusCategory::BadRequest,
		error: true,
		status_code: 0,
		auth_key: None,
		operation: Operation::Leave,
		affected_channels: vec![],
		affected_channel_groups: vec![],
		client_request: None,
		origin: None,
		tls_enabled: false,
	}
}

/// The single public entry point: serializes builder mutations and
/// owns every background task (subscribe loop, dispatcher, heartbeat,
/// reconnection polling, delayed reconnection).
pub struct SubscriptionManager {
	ctx: Arc<LoopContext>,
	leave_transport: Arc<dyn LeaveTransport>,
	dispatcher: Mutex<Option<Dispatcher>>,
}

impl SubscriptionManager {
	pub fn new(
		config: Configuration,
		subscribe_transport: Arc<dyn SubscribeTransport>,
		heartbeat_transport: Arc<dyn HeartbeatTransport>,
		leave_transport: Arc<dyn LeaveTransport>,
		probe_transport: Arc<dyn ProbeTransport>,
	) -> Self {
		let listeners = Arc::new(ListenerRegistry::default());
		let (message_tx, message_rx) = dispatch::channel();
		let dedup_for_dispatcher = Arc::new(Mutex::new(DuplicationFilter::new(
			config.duplication_filter_capacity,
		)));

		let dispatcher = config.start_subscriber_thread.then(|| {
			Dispatcher::spawn(
				message_rx,
				Arc::clone(&dedup_for_dispatcher),
				Arc::clone(&listeners),
			)
		});

		let registry = Arc::new(Mutex::new(SubscriptionRegistry::new()));

		let heartbeat = Arc::new(HeartbeatScheduler::new(
			config.heartbeat_interval,
			config.heartbeat_notification_options,
			heartbeat_transport,
			Arc::clone(&registry),
			Arc::clone(&listeners),
		));

		let reconnection = Arc::new(ReconnectionController::new(
			probe_transport,
			config.reconnection_policy,
			config.reconnection_min_delay,
			config.reconnection_max_delay,
			config.max_reconnection_attempts,
		));

		let ctx = Arc::new(LoopContext {
			facade: Mutex::new(FacadeState::default()),
			registry,
			dedup: dedup_for_dispatcher,
			message_tx: Mutex::new(Some(message_tx)),
			listeners,
			subscribe_transport,
			heartbeat,
			reconnection,
			delayed: DelayedReconnection::new(config.delayed_reconnection_interval),
			config,
			loop_handle: Mutex::new(None),
			self_weak: OnceLock::new(),
		});
		let _ = ctx.self_weak.set(Arc::downgrade(&ctx));

		Self {
			ctx,
			leave_transport,
			dispatcher: Mutex::new(dispatcher),
		}
	}

	pub fn add_listener(&self, listener: Arc<dyn Listener>) -> ListenerId {
		self.ctx.listeners.add(listener)
	}

	pub fn remove_listener(&self, id: ListenerId) {
		self.ctx.listeners.remove(id);
	}

	pub fn get_subscribed_channels(&self) -> Vec<String> {
		self.ctx.registry.lock().unwrap().target_channels(false)
	}

	pub fn get_subscribed_channel_groups(&self) -> Vec<String> {
		self.ctx.registry.lock().unwrap().target_groups(false)
	}

	/// Applies a subscribe mutation and restarts the loop.
	///
	/// Cursor policy on mix change: an explicit `op.timetoken` is
	/// adopted as-is; otherwise the current `timetoken`, if nonzero, is
	/// preserved into `stored_timetoken` before `timetoken` is reset to
	/// zero to force a fresh connected response.
	pub fn subscribe(&self, op: SubscribeOp) {
		let explicit_timetoken = op.timetoken;
		let changed = self.ctx.registry.lock().unwrap().apply_subscribe(op);

		if changed {
			self.ctx.dedup.lock().unwrap().clear();
			let mut facade = self.ctx.facade.lock().unwrap();
			facade.subscription_status_announced = false;

			if let Some(timetoken) = explicit_timetoken {
				facade.timetoken = timetoken;
			} else {
				if !facade.timetoken.is_zero() {
					facade.stored_timetoken = Some(facade.timetoken);
				}
				facade.timetoken = Timetoken::ZERO;
			}
		}

		self.reconnect();
	}

	/// Applies an unsubscribe mutation, optionally dispatches a Leave
	/// request, and restarts the loop.
	///
	/// Cursor policy: if the registry becomes empty, `region` and
	/// `stored_timetoken` are cleared and `timetoken` resets to zero;
	/// otherwise the current `timetoken` is preserved into
	/// `stored_timetoken` before resetting to zero.
	pub async fn unsubscribe(&self, op: UnsubscribeOp) {
		let leave_request = LeaveRequest {
			channels: op.channels.clone(),
			channel_groups: op.channel_groups.clone(),
		};

		let (changed, now_empty) = {
			let mut registry = self.ctx.registry.lock().unwrap();
			let changed = registry.apply_unsubscribe(op);
			(changed, registry.is_empty())
		};

		if changed {
			self.ctx.dedup.lock().unwrap().clear();
			let mut facade = self.ctx.facade.lock().unwrap();
			facade.subscription_status_announced = false;

			if now_empty {
				facade.region = None;
				facade.stored_timetoken = None;
				facade.timetoken = Timetoken::ZERO;
			} else {
				if !facade.timetoken.is_zero() {
					facade.stored_timetoken = Some(facade.timetoken);
				}
				facade.timetoken = Timetoken::ZERO;
			}
		}

		if !self.ctx.config.suppress_leave_events {
			match self.leave_transport.leave(leave_request).await {
				LeaveOutcome::Ok | LeaveOutcome::AccessDenied => {}
				LeaveOutcome::Failed => {
					self.ctx.listeners.announce_status(&leave_failure_status());
				}
			}
		}

		self.reconnect();
	}

	pub async fn unsubscribe_all(&self) {
		let (channels, channel_groups) = {
			let registry = self.ctx.registry.lock().unwrap();
			(registry.target_channels(false), registry.target_groups(false))
		};
		self.unsubscribe(UnsubscribeOp {
			channels,
			channel_groups,
		})
		.await;
	}

	pub fn set_presence_state(&self, op: StateOp) {
		self.ctx.registry.lock().unwrap().apply_state(op);
	}

	pub fn set_presence_connected(&self, op: PresenceOp) {
		self.ctx.registry.lock().unwrap().apply_presence(op);
	}

	/// Sets `connected = true`, (re)starts the subscribe loop, and
	/// re-registers the heartbeat timer.
	pub fn reconnect(&self) {
		self.ctx.facade.lock().unwrap().connected = true;
		self.ctx.restart_loop();
		self.ctx.heartbeat.register_heartbeat_timer();
	}

	/// Tears down all timers and cancels the outstanding call, without
	/// touching the dispatcher.
	pub fn disconnect(&self) {
		self.ctx.facade.lock().unwrap().connected = false;
		self.ctx.registry.lock().unwrap().reset_temporary_unavailable();

		if let Some(handle) = self.ctx.loop_handle.lock().unwrap().take() {
			handle.abort();
		}
		self.ctx.heartbeat.stop();
		self.ctx.reconnection.cancel();
		self.ctx.delayed.cancel();
	}

	/// Disconnects and additionally terminates the dispatcher.
	/// `force = true` aborts the dispatcher mid-drain rather than
	/// letting it finish whatever is already queued.
	///
	/// Drops the message sender first so the dispatcher's channel
	/// closes and its drain loop can exit on its own; otherwise
	/// awaiting its handle with `force = false` would never return.
	/// Errs with [`crate::Error::Destroyed`] if called more than once --
	/// a manager constructed with `start_subscriber_thread = false`
	/// (no dispatcher to stop) still destroys cleanly on the first call.
	pub async fn destroy(&self, force: bool) -> crate::Result<()> {
		self.disconnect();
		let already_destroyed = self.ctx.message_tx.lock().unwrap().take().is_none();
		if already_destroyed {
			return Err(crate::Error::Destroyed);
		}
		match self.dispatcher.lock().unwrap().take() {
			Some(dispatcher) => dispatcher.stop(force).await,
			None => Ok(()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::mock::MockTransport;

	fn manager() -> (SubscriptionManager, Arc<MockTransport>) {
		let transport = Arc::new(MockTransport::new());
		let manager = SubscriptionManager::new(
			Configuration {
				start_subscriber_thread: false,
				..Default::default()
			},
			transport.clone(),
			transport.clone(),
			transport.clone(),
			transport.clone(),
		);
		(manager, transport)
	}

	#[tokio::test]
	async fn subscribe_then_unsubscribe_resets_cursor() {
		let (manager, _transport) = manager();
		manager.subscribe(SubscribeOp {
			channels: vec!["a".into()],
			..Default::default()
		});
		assert_eq!(manager.get_subscribed_channels(), vec!["a".to_string()]);

		manager
			.unsubscribe(UnsubscribeOp {
				channels: vec!["a".into()],
				channel_groups: vec![],
			})
			.await;
		assert!(manager.get_subscribed_channels().is_empty());
		assert!(manager.ctx.facade.lock().unwrap().timetoken.is_zero());
	}

	#[tokio::test]
	async fn disconnect_clears_temporary_unavailable() {
		let (manager, _transport) = manager();
		manager.subscribe(SubscribeOp {
			channels: vec!["a".into()],
			..Default::default()
		});
		manager
			.ctx
			.registry
			.lock()
			.unwrap()
			.add_temporary_unavailable_channel("a");
		manager.disconnect();
		assert!(!manager
			.ctx
			.registry
			.lock()
			.unwrap()
			.subscribed_to_only_temporary_unavailable());
	}

	#[tokio::test(start_paused = true)]
	async fn destroy_without_force_does_not_hang_draining_the_dispatcher() {
		let transport = Arc::new(MockTransport::new());
		let manager = SubscriptionManager::new(
			Configuration {
				start_subscriber_thread: true,
				..Default::default()
			},
			transport.clone(),
			transport.clone(),
			transport.clone(),
			transport.clone(),
		);
		manager.subscribe(SubscribeOp {
			channels: vec!["a".into()],
			..Default::default()
		});

		// Would hang forever pre-fix: `stop(false)` awaits the
		// dispatcher task, which only exits once its sender half is
		// dropped.
		manager.destroy(false).await.unwrap();
	}

	#[tokio::test]
	async fn destroying_twice_surfaces_an_error() {
		let (manager, _transport) = manager();
		manager.destroy(false).await.unwrap();
		assert!(matches!(
			manager.destroy(false).await,
			Err(crate::Error::Destroyed)
		));
	}
}
