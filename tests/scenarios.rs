//! End-to-end scenarios driving [`SubscriptionManager`] against
//! [`transport::mock::MockTransport`].

use std::{
	sync::{Arc, Mutex},
	time::Duration,
};
use substream::{
	transport::{
		mock::MockTransport, LeaveOutcome, ResponseMetadata, SubscribeCallResult,
		SubscribeEnvelope, TransportError,
	},
	Configuration, Listener, Operation, StatusCategory, SubscribeOp, SubscribeStatus, Timetoken,
	UnsubscribeOp,
};

fn ack(timetoken: i64, region: &str) -> SubscribeCallResult {
	SubscribeCallResult {
		status: status(StatusCategory::Acknowledgment, false, vec![], vec![]),
		envelope: Some(SubscribeEnvelope {
			messages: vec![],
			metadata: ResponseMetadata {
				timetoken: Timetoken(timetoken),
				region: Some(region.to_string()),
			},
		}),
	}
}

fn status(
	category: StatusCategory,
	error: bool,
	affected_channels: Vec<String>,
	affected_channel_groups: Vec<String>,
) -> SubscribeStatus {
	SubscribeStatus {
		category,
		error,
		status_code: if error { 403 } else { 200 },
		auth_key: None,
		operation: Operation::Subscribe,
		affected_channels,
		affected_channel_groups,
		client_request: None,
		origin: None,
		tls_enabled: false,
	}
}

#[derive(Default)]
struct Recorder {
	statuses: Mutex<Vec<SubscribeStatus>>,
}

impl Listener for Recorder {
	fn status(&self, status: &SubscribeStatus) {
		self.statuses.lock().unwrap().push(status.clone());
	}
}

impl Recorder {
	fn categories(&self) -> Vec<StatusCategory> {
		self.statuses.lock().unwrap().iter().map(|s| s.category).collect()
	}
}

fn test_config() -> Configuration {
	Configuration {
		start_subscriber_thread: false,
		reconnection_min_delay: Duration::from_millis(1),
		reconnection_max_delay: Duration::from_millis(5),
		delayed_reconnection_interval: Duration::from_millis(20),
		..Default::default()
	}
}

#[tokio::test(start_paused = true)]
async fn cold_subscribe_announces_connected_once() {
	let transport = Arc::new(MockTransport::new());
	transport.push_subscribe_response(ack(1000, "1"));

	let manager = substream::SubscriptionManager::new(
		test_config(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
	);
	let recorder = Arc::new(Recorder::default());
	manager.add_listener(recorder.clone());

	manager.subscribe(SubscribeOp {
		channels: vec!["a".into(), "b".into()],
		..Default::default()
	});

	tokio::time::sleep(Duration::from_millis(50)).await;

	assert_eq!(recorder.categories(), vec![StatusCategory::Connected]);
	let requests = transport.subscribe_requests.lock().unwrap();
	assert!(requests.len() >= 2);
	assert_eq!(requests[1].timetoken, Timetoken(1000));
	assert_eq!(requests[1].region.as_deref(), Some("1"));
}

#[tokio::test(start_paused = true)]
async fn mix_change_preserves_and_restores_cursor() {
	let transport = Arc::new(MockTransport::new());
	transport.push_subscribe_response(ack(1000, "1"));

	let manager = substream::SubscriptionManager::new(
		test_config(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
	);

	manager.subscribe(SubscribeOp {
		channels: vec!["a".into()],
		..Default::default()
	});
	tokio::time::sleep(Duration::from_millis(50)).await;

	// Now the loop is parked waiting on the next long-poll at
	// timetoken=1000; script its response, then trigger the mix
	// change.
	transport.push_subscribe_response(ack(1200, "1"));
	manager.subscribe(SubscribeOp {
		channels: vec!["c".into()],
		..Default::default()
	});
	tokio::time::sleep(Duration::from_millis(50)).await;

	let requests = transport.subscribe_requests.lock().unwrap();
	// request after the mix change: timetoken=0
	let post_change = requests.iter().find(|r| r.channels.contains(&"c".to_string()));
	assert!(post_change.is_some());
	assert_eq!(post_change.unwrap().timetoken, Timetoken::ZERO);
}

#[tokio::test(start_paused = true)]
async fn access_denied_isolates_the_affected_channel() {
	let transport = Arc::new(MockTransport::new());
	transport.push_subscribe_response(SubscribeCallResult {
		status: status(StatusCategory::AccessDenied, true, vec!["b".into()], vec![]),
		envelope: None,
	});
	transport.push_subscribe_response(ack(500, "1"));

	let manager = substream::SubscriptionManager::new(
		test_config(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
	);
	let recorder = Arc::new(Recorder::default());
	manager.add_listener(recorder.clone());

	manager.subscribe(SubscribeOp {
		channels: vec!["a".into(), "b".into(), "c".into()],
		..Default::default()
	});
	tokio::time::sleep(Duration::from_millis(50)).await;

	assert!(recorder.categories().contains(&StatusCategory::AccessDenied));
	let requests = transport.subscribe_requests.lock().unwrap();
	let after_denial = requests.last().unwrap();
	assert!(!after_denial.channels.contains(&"b".to_string()));
	assert!(after_denial.channels.contains(&"a".to_string()));
	assert!(after_denial.channels.contains(&"c".to_string()));
}

#[tokio::test(start_paused = true)]
async fn all_temporarily_unavailable_sleeps_then_retries_once() {
	let transport = Arc::new(MockTransport::new());
	transport.push_subscribe_response(SubscribeCallResult {
		status: status(StatusCategory::AccessDenied, true, vec!["x".into()], vec![]),
		envelope: None,
	});

	let manager = substream::SubscriptionManager::new(
		test_config(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
	);

	manager.subscribe(SubscribeOp {
		channels: vec!["x".into()],
		..Default::default()
	});
	tokio::time::sleep(Duration::from_millis(50)).await;

	// "x" is now fully unavailable; no further call should be
	// outstanding before the delayed re-entry fires.
	let before = transport.subscribe_requests.lock().unwrap().len();
	assert_eq!(before, 1);

	transport.push_subscribe_response(ack(10, "1"));
	tokio::time::sleep(Duration::from_millis(50)).await;

	let after = transport.subscribe_requests.lock().unwrap().len();
	assert_eq!(after, 2);
}

#[tokio::test(start_paused = true)]
async fn hard_disconnect_then_recovery_announces_reconnected() {
	let transport = Arc::new(MockTransport::new());
	transport.push_subscribe_response(SubscribeCallResult {
		status: status(StatusCategory::UnexpectedDisconnect, true, vec![], vec![]),
		envelope: None,
	});
	transport.push_probe_result(Ok(()));

	let manager = substream::SubscriptionManager::new(
		test_config(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
	);
	let recorder = Arc::new(Recorder::default());
	manager.add_listener(recorder.clone());

	manager.subscribe(SubscribeOp {
		channels: vec!["a".into()],
		..Default::default()
	});

	tokio::time::sleep(Duration::from_millis(100)).await;

	let categories = recorder.categories();
	assert!(categories.contains(&StatusCategory::UnexpectedDisconnect));
	assert!(categories.contains(&StatusCategory::Reconnected));
}

#[tokio::test(start_paused = true)]
async fn heartbeat_failure_stops_further_heartbeats_until_reregistered() {
	let transport = Arc::new(MockTransport::new());
	transport.push_subscribe_response(ack(1, "1"));
	// The first heartbeat fails; the scheduler must stop itself rather
	// than keep firing on the 10ms interval.
	transport.push_heartbeat_result(Err(TransportError));

	let manager = substream::SubscriptionManager::new(
		Configuration {
			start_subscriber_thread: false,
			heartbeat_interval: Duration::from_millis(10),
			reconnection_min_delay: Duration::from_millis(1),
			reconnection_max_delay: Duration::from_millis(5),
			delayed_reconnection_interval: Duration::from_millis(20),
			..Default::default()
		},
		transport.clone(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
	);
	let recorder = Arc::new(Recorder::default());
	manager.add_listener(recorder.clone());

	manager.subscribe(SubscribeOp {
		channels: vec!["a".into()],
		..Default::default()
	});
	tokio::time::sleep(Duration::from_millis(50)).await;

	// Default verbosity is `FAILURES`: the one failure is announced...
	assert!(recorder.categories().contains(&StatusCategory::BadRequest));
	assert_eq!(transport.heartbeat_requests.lock().unwrap().len(), 1);

	// ...and no further heartbeats fire even though far more than one
	// 10ms interval has elapsed.
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(transport.heartbeat_requests.lock().unwrap().len(), 1);

	// A new builder operation re-registers the timer; it fires again.
	transport.push_heartbeat_result(Ok(()));
	manager.subscribe(SubscribeOp {
		channels: vec!["b".into()],
		..Default::default()
	});
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(transport.heartbeat_requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn leave_access_denied_is_suppressed() {
	let transport = Arc::new(MockTransport::new());
	transport.push_leave_outcome(LeaveOutcome::AccessDenied);

	let manager = substream::SubscriptionManager::new(
		test_config(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
		transport.clone(),
	);
	let recorder = Arc::new(Recorder::default());
	manager.add_listener(recorder.clone());

	manager.subscribe(SubscribeOp {
		channels: vec!["a".into()],
		..Default::default()
	});
	manager
		.unsubscribe(UnsubscribeOp {
			channels: vec!["a".into()],
			channel_groups: vec![],
		})
		.await;

	assert!(!recorder.categories().contains(&StatusCategory::BadRequest));
}
