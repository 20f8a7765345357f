//! Backoff policy and the controller that polls connectivity after a
//! hard failure.

use crate::transport::ProbeTransport;
use std::{
	sync::{Arc, Mutex},
	time::Duration,
};
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReconnectionPolicy {
	#[default]
	Linear,
	Exponential,
}

/// Tracks the current delay between reconnection attempts and
/// advances it according to the configured policy.
#[derive(Debug, Clone)]
pub struct Backoff {
	policy: ReconnectionPolicy,
	min: Duration,
	max: Duration,
	cur: Option<Duration>,
}

impl Backoff {
	pub fn new(policy: ReconnectionPolicy, min: Duration, max: Duration) -> Self {
		Self {
			policy,
			min,
			max,
			cur: None,
		}
	}

	pub fn reset(&mut self) {
		self.cur = None;
	}

	/// Returns the delay to wait before the next attempt, then
	/// advances internal state for the attempt after that.
	pub fn next(&mut self) -> Duration {
		let delay = self.cur.unwrap_or(self.min);
		let advanced = match self.policy {
			ReconnectionPolicy::Linear => delay + self.min,
			ReconnectionPolicy::Exponential => delay * 2,
		};
		self.cur = Some(advanced.min(self.max));
		delay
	}
}

/// Outcome of waiting out a reconnection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectionOutcome {
	Reconnected,
	Exhausted,
}

#[async_trait::async_trait]
pub trait ReconnectionListener: Send + Sync {
	async fn on_outcome(&self, outcome: ReconnectionOutcome);
}

/// Polls [`ProbeTransport::probe`] on a backoff schedule until it
/// succeeds or `max_attempts` is exhausted, then reports the outcome
/// to an injected listener. Only one poll loop runs at a time --
/// starting a new one cancels any loop already in flight.
pub struct ReconnectionController {
	transport: Arc<dyn ProbeTransport>,
	policy: ReconnectionPolicy,
	min_delay: Duration,
	max_delay: Duration,
	max_attempts: Option<u32>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectionController {
	pub fn new(
		transport: Arc<dyn ProbeTransport>,
		policy: ReconnectionPolicy,
		min_delay: Duration,
		max_delay: Duration,
		max_attempts: Option<u32>,
	) -> Self {
		Self {
			transport,
			policy,
			min_delay,
			max_delay,
			max_attempts,
			task: Mutex::new(None),
		}
	}

	pub fn start(self: &Arc<Self>, listener: Arc<dyn ReconnectionListener>) {
		self.cancel();

		let this = Arc::clone(self);
		let handle = tokio::spawn(async move {
			let mut backoff = Backoff::new(this.policy, this.min_delay, this.max_delay);
			let mut attempt: u32 = 0;

			loop {
				if let Some(max) = this.max_attempts {
					if attempt >= max {
						listener.on_outcome(ReconnectionOutcome::Exhausted).await;
						return;
					}
				}

				let delay = backoff.next();
				tokio::time::sleep(delay).await;
				attempt += 1;

				if this.transport.probe().await.is_ok() {
					listener.on_outcome(ReconnectionOutcome::Reconnected).await;
					return;
				}
			}
		});

		*self.task.lock().unwrap() = Some(handle);
	}

	pub fn cancel(&self) {
		if let Some(handle) = self.task.lock().unwrap().take() {
			handle.abort();
		}
	}
}

/// A one-shot timer scheduling a single delayed reconnection attempt
/// (distinct from the polling controller: this fires exactly once).
/// Scheduling a new timer replaces any timer already pending.
pub struct DelayedReconnection {
	delay: Duration,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl DelayedReconnection {
	pub fn new(delay: Duration) -> Self {
		Self {
			delay,
			task: Mutex::new(None),
		}
	}

	pub fn schedule<F>(&self, action: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.cancel();
		let delay = self.delay;
		let handle = tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			action();
		});
		*self.task.lock().unwrap() = Some(handle);
	}

	pub fn cancel(&self) {
		if let Some(handle) = self.task.lock().unwrap().take() {
			handle.abort();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn linear_backoff_grows_by_fixed_steps() {
		let mut backoff = Backoff::new(
			ReconnectionPolicy::Linear,
			Duration::from_secs(1),
			Duration::from_secs(10),
		);
		assert_eq!(backoff.next(), Duration::from_secs(1));
		assert_eq!(backoff.next(), Duration::from_secs(2));
		assert_eq!(backoff.next(), Duration::from_secs(3));
	}

	#[test]
	fn exponential_backoff_doubles_and_caps() {
		let mut backoff = Backoff::new(
			ReconnectionPolicy::Exponential,
			Duration::from_secs(1),
			Duration::from_secs(5),
		);
		assert_eq!(backoff.next(), Duration::from_secs(1));
		assert_eq!(backoff.next(), Duration::from_secs(2));
		assert_eq!(backoff.next(), Duration::from_secs(4));
		assert_eq!(backoff.next(), Duration::from_secs(5));
	}

	#[test]
	fn reset_returns_to_the_minimum() {
		let mut backoff = Backoff::new(
			ReconnectionPolicy::Linear,
			Duration::from_secs(1),
			Duration::from_secs(10),
		);
		backoff.next();
		backoff.next();
		backoff.reset();
		assert_eq!(backoff.next(), Duration::from_secs(1));
	}

	#[tokio::test(start_paused = true)]
	async fn controller_reports_reconnected_once_probe_succeeds() {
		use crate::transport::mock::MockTransport;
		use std::sync::atomic::{AtomicBool, Ordering};

		struct Recorder(Arc<AtomicBool>);
		#[async_trait::async_trait]
		impl ReconnectionListener for Recorder {
			async fn on_outcome(&self, outcome: ReconnectionOutcome) {
				if outcome == ReconnectionOutcome::Reconnected {
					self.0.store(true, Ordering::SeqCst);
				}
			}
		}

		let transport = Arc::new(MockTransport::new());
		transport.push_probe_result(Err(crate::transport::TransportError));
		transport.push_probe_result(Ok(()));

		let controller = Arc::new(ReconnectionController::new(
			transport,
			ReconnectionPolicy::Linear,
			Duration::from_millis(1),
			Duration::from_millis(10),
			None,
		));
		let reconnected = Arc::new(AtomicBool::new(false));
		controller.start(Arc::new(Recorder(reconnected.clone())));

		tokio::time::sleep(Duration::from_millis(100)).await;
		assert!(reconnected.load(Ordering::SeqCst));
	}

	#[tokio::test(start_paused = true)]
	async fn controller_reports_exhausted_after_max_attempts() {
		use crate::transport::mock::MockTransport;
		use std::sync::atomic::{AtomicBool, Ordering};

		struct Recorder(Arc<AtomicBool>);
		#[async_trait::async_trait]
		impl ReconnectionListener for Recorder {
			async fn on_outcome(&self, outcome: ReconnectionOutcome) {
				if outcome == ReconnectionOutcome::Exhausted {
					self.0.store(true, Ordering::SeqCst);
				}
			}
		}

		let transport = Arc::new(MockTransport::new());
		let controller = Arc::new(ReconnectionController::new(
			transport,
			ReconnectionPolicy::Linear,
			Duration::from_millis(1),
			Duration::from_millis(10),
			Some(2),
		));
		let exhausted = Arc::new(AtomicBool::new(false));
		controller.start(Arc::new(Recorder(exhausted.clone())));

		tokio::time::sleep(Duration::from_millis(100)).await;
		assert!(exhausted.load(Ordering::SeqCst));
	}
}
