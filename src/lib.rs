//! # substream
//!
//! The subscription engine of a publish/subscribe client: it keeps a
//! connection continuously subscribed to a named set of channels and
//! channel groups over a long-poll transport, delivers messages in
//! order without duplicates, emits lifecycle status events, sustains
//! presence via periodic heartbeats, and recovers from transient
//! network and server failures.
//!
//! The crate does not perform any HTTP I/O itself -- [`transport`]
//! describes the abstract contracts a concrete transport must
//! implement. See [`manager::SubscriptionManager`] for the public
//! entry point.
#![allow(clippy::tabs_in_doc_comments)]

mod dedup;
mod dispatch;
mod error;
mod heartbeat;
mod listener;
mod manager;
mod misc;
mod reconnection;
mod registry;
mod status;
mod subscribe_loop;

pub mod message;
pub mod transport;

pub use crate::{
	error::{Error, Result},
	heartbeat::HeartbeatNotificationOptions,
	listener::{Listener, ListenerId},
	manager::{Configuration, SubscriptionManager},
	message::{Message, MessageType},
	misc::{StateValue, Timetoken},
	reconnection::ReconnectionPolicy,
	registry::{PresenceOp, StateOp, SubscribeOp, UnsubscribeOp},
	status::{Operation, StatusCategory, SubscribeStatus},
};
