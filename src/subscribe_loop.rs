//! The subscribe state machine: builds, launches, and handles one
//! outstanding long-poll at a time, re-entering itself in tail
//! position rather than recursing.

use crate::{
	manager::LoopContext,
	status::StatusCategory,
	transport::{SubscribeCallResult, SubscribeRequest},
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Spawns one run of the loop. Restarting the loop elsewhere is done
/// by calling this again and replacing the stored handle, never by
/// this function calling itself recursively.
pub(crate) fn spawn(ctx: Arc<LoopContext>) -> JoinHandle<()> {
	tokio::spawn(run(ctx))
}

async fn run(ctx: Arc<LoopContext>) {
	loop {
		if !ctx.facade.lock().unwrap().connected {
			return;
		}

		if !ctx.registry.lock().unwrap().has_anything_to_subscribe() {
			return;
		}

		if ctx
			.registry
			.lock()
			.unwrap()
			.subscribed_to_only_temporary_unavailable()
		{
			schedule_delayed_reentry(&ctx);
			return;
		}

		let request = {
			let registry = ctx.registry.lock().unwrap();
			let facade = ctx.facade.lock().unwrap();
			SubscribeRequest {
				channels: registry.effective_channels(),
				channel_groups: registry.effective_channel_groups(),
				timetoken: facade.timetoken,
				region: facade.region.clone(),
				filter_expression: ctx.config.filter_expression.clone(),
				state: registry.create_state_payload(),
			}
		};

		let result = ctx.subscribe_transport.subscribe(request).await;

		match result.status.category {
			StatusCategory::Acknowledgment => {
				handle_success(&ctx, result);
				continue;
			}
			StatusCategory::Timeout => continue,
			StatusCategory::UnexpectedDisconnect => {
				tracing::warn!("subscribe call reported an unexpected disconnect");
				disconnect_for_reconnection(&ctx);
				ctx.listeners.announce_status(&result.status);
				let listener: Arc<dyn crate::reconnection::ReconnectionListener> =
					Arc::clone(&ctx);
				ctx.reconnection.start(listener);
				return;
			}
			StatusCategory::BadRequest | StatusCategory::UriTooLong => {
				tracing::error!(category = ?result.status.category, "subscribe call failed terminally");
				disconnect_for_reconnection(&ctx);
				ctx.listeners.announce_status(&result.status);
				return;
			}
			StatusCategory::AccessDenied => {
				let any_affected = !result.status.affected_channels.is_empty()
					|| !result.status.affected_channel_groups.is_empty();
				tracing::debug!(
					channels = ?result.status.affected_channels,
					groups = ?result.status.affected_channel_groups,
					"access denied, marking affected channels temporarily unavailable"
				);
				{
					let mut registry = ctx.registry.lock().unwrap();
					for channel in &result.status.affected_channels {
						registry.add_temporary_unavailable_channel(channel);
					}
					for group in &result.status.affected_channel_groups {
						registry.add_temporary_unavailable_group(group);
					}
				}
				ctx.listeners.announce_status(&result.status);
				if any_affected {
					continue;
				}
				return;
			}
			_ => {
				ctx.listeners.announce_status(&result.status);
				schedule_delayed_reentry(&ctx);
				return;
			}
		}
	}
}

/// The success path: releases affected channels/groups from temporary
/// unavailability, announces the connected status on the first
/// success of a mix episode, announces a message-count-exceeded
/// status if configured and breached, enqueues messages, and advances
/// the cursor.
fn handle_success(ctx: &Arc<LoopContext>, result: SubscribeCallResult) {
	let envelope = match result.envelope {
		Some(envelope) => envelope,
		None => return,
	};

	{
		let mut registry = ctx.registry.lock().unwrap();
		for channel in &result.status.affected_channels {
			registry.remove_temporary_unavailable_channel(channel);
		}
		for group in &result.status.affected_channel_groups {
			registry.remove_temporary_unavailable_group(group);
		}
	}

	let mut facade = ctx.facade.lock().unwrap();

	if !facade.subscription_status_announced {
		facade.subscription_status_announced = true;
		let connected = result.status.project(StatusCategory::Connected, false);
		ctx.listeners.announce_status(&connected);
	}

	if let Some(threshold) = ctx.config.request_message_count_threshold {
		if envelope.messages.len() >= threshold {
			let exceeded =
				result.status.project(StatusCategory::RequestMessageCountExceeded, false);
			ctx.listeners.announce_status(&exceeded);
		}
	}

	let sender = ctx.message_tx.lock().unwrap().clone();
	if let Some(sender) = sender {
		for message in envelope.messages {
			if let Err(err) = sender.send(message) {
				let err: crate::Error = err.into();
				tracing::warn!(%err, "failed to enqueue message, dispatcher is gone");
			}
		}
	}

	if let Some(stored) = facade.stored_timetoken.take() {
		facade.timetoken = stored;
	} else {
		facade.timetoken = envelope.metadata.timetoken;
	}
	facade.region = envelope.metadata.region;
}

/// Disconnects the loop state ahead of reconnection polling or a
/// terminal stop: stops the heartbeat timer and clears the
/// temporarily-unavailable sets, mirroring `disconnect()`'s contract
/// without touching listener registration or the dispatcher.
fn disconnect_for_reconnection(ctx: &Arc<LoopContext>) {
	ctx.facade.lock().unwrap().connected = false;
	ctx.registry.lock().unwrap().reset_temporary_unavailable();
	ctx.heartbeat.stop();
}

fn schedule_delayed_reentry(ctx: &Arc<LoopContext>) {
	let ctx = Arc::clone(ctx);
	ctx.delayed.schedule(move || {
		ctx.facade.lock().unwrap().connected = true;
		let handle = spawn(Arc::clone(&ctx));
		if let Some(previous) = ctx.loop_handle.lock().unwrap().replace(handle) {
			previous.abort();
		}
	});
}
