//! Abstract contracts for the Subscribe/Heartbeat/Leave/probe
//! endpoints.
//!
//! HTTP request construction, cancellation, and wire-format parsing
//! are deliberately out of scope here -- a real transport is supplied
//! by the caller. [`mock`] provides an in-memory implementation used
//! by this crate's own tests.

use crate::{
	message::Message,
	misc::{StateValue, Timetoken},
	status::SubscribeStatus,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
#[error("transport failed to complete the request")]
pub struct TransportError;

#[derive(Clone, Debug, Default)]
pub struct SubscribeRequest {
	pub channels: Vec<String>,
	pub channel_groups: Vec<String>,
	pub timetoken: Timetoken,
	pub region: Option<String>,
	pub filter_expression: Option<String>,
	pub state: BTreeMap<String, StateValue>,
}

#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	pub timetoken: Timetoken,
	pub region: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct SubscribeEnvelope {
	pub messages: Vec<Message>,
	pub metadata: ResponseMetadata,
}

/// The outcome of one long-poll call: always a [`SubscribeStatus`]
/// describing what happened, with the envelope present only when
/// `status.category` is [`crate::StatusCategory::Acknowledgment`].
#[derive(Clone, Debug)]
pub struct SubscribeCallResult {
	pub status: SubscribeStatus,
	pub envelope: Option<SubscribeEnvelope>,
}

#[derive(Clone, Debug, Default)]
pub struct HeartbeatRequest {
	pub channels: Vec<String>,
	pub channel_groups: Vec<String>,
	pub state: BTreeMap<String, StateValue>,
}

#[derive(Clone, Debug, Default)]
pub struct LeaveRequest {
	pub channels: Vec<String>,
	pub channel_groups: Vec<String>,
}

/// Outcome of a Leave call. Distinguished from a plain
/// `Result<(), TransportError>` because the facade treats an
/// access-denied leave failure differently from every other failure:
/// it is suppressed rather than announced to listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
	Ok,
	AccessDenied,
	Failed,
}

#[async_trait]
pub trait SubscribeTransport: Send + Sync {
	async fn subscribe(&self, request: SubscribeRequest) -> SubscribeCallResult;
}

#[async_trait]
pub trait HeartbeatTransport: Send + Sync {
	async fn heartbeat(&self, request: HeartbeatRequest) -> Result<(), TransportError>;
}

#[async_trait]
pub trait LeaveTransport: Send + Sync {
	async fn leave(&self, request: LeaveRequest) -> LeaveOutcome;
}

/// A low-cost probe (e.g. a time-endpoint call) the reconnection
/// controller polls to detect restored connectivity.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
	async fn probe(&self) -> Result<(), TransportError>;
}

pub mod mock {
	//! An in-memory transport for tests: every call is satisfied from a
	//! scripted queue of responses.

	use super::*;
	use std::sync::Mutex;

	#[derive(Default)]
	pub struct MockTransport {
		subscribe_responses: Mutex<std::collections::VecDeque<SubscribeCallResult>>,
		probe_results: Mutex<std::collections::VecDeque<Result<(), TransportError>>>,
		leave_outcomes: Mutex<std::collections::VecDeque<LeaveOutcome>>,
		heartbeat_results: Mutex<std::collections::VecDeque<Result<(), TransportError>>>,
		pub subscribe_requests: Mutex<Vec<SubscribeRequest>>,
		pub leave_requests: Mutex<Vec<LeaveRequest>>,
		pub heartbeat_requests: Mutex<Vec<HeartbeatRequest>>,
	}

	impl MockTransport {
		pub fn new() -> Self {
			Self::default()
		}

		pub fn push_subscribe_response(&self, result: SubscribeCallResult) {
			self.subscribe_responses.lock().unwrap().push_back(result);
		}

		pub fn push_probe_result(&self, result: Result<(), TransportError>) {
			self.probe_results.lock().unwrap().push_back(result);
		}

		pub fn push_leave_outcome(&self, outcome: LeaveOutcome) {
			self.leave_outcomes.lock().unwrap().push_back(outcome);
		}

		pub fn push_heartbeat_result(&self, result: Result<(), TransportError>) {
			self.heartbeat_results.lock().unwrap().push_back(result);
		}
	}

	#[async_trait]
	impl SubscribeTransport for MockTransport {
		async fn subscribe(&self, request: SubscribeRequest) -> SubscribeCallResult {
			self.subscribe_requests.lock().unwrap().push(request);
			self.subscribe_responses
				.lock()
				.unwrap()
				.pop_front()
				.unwrap_or(SubscribeCallResult {
					status: SubscribeStatus {
						category: crate::status::StatusCategory::Timeout,
						error: false,
						status_code: 0,
						auth_key: None,
						operation: crate::status::Operation::Subscribe,
						affected_channels: vec![],
						affected_channel_groups: vec![],
						client_request: None,
						origin: None,
						tls_enabled: false,
					},
					envelope: None,
				})
		}
	}

	#[async_trait]
	impl HeartbeatTransport for MockTransport {
		async fn heartbeat(&self, request: HeartbeatRequest) -> Result<(), TransportError> {
			self.heartbeat_requests.lock().unwrap().push(request);
			self.heartbeat_results
				.lock()
				.unwrap()
				.pop_front()
				.unwrap_or(Ok(()))
		}
	}

	#[async_trait]
	impl LeaveTransport for MockTransport {
		async fn leave(&self, request: LeaveRequest) -> LeaveOutcome {
			self.leave_requests.lock().unwrap().push(request);
			self.leave_outcomes
				.lock()
				.unwrap()
				.pop_front()
				.unwrap_or(LeaveOutcome::Ok)
		}
	}

	#[async_trait]
	impl ProbeTransport for MockTransport {
		async fn probe(&self) -> Result<(), TransportError> {
			self.probe_results
				.lock()
				.unwrap()
				.pop_front()
				.unwrap_or(Ok(()))
		}
	}
}
