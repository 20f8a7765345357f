/// The operation a [`SubscribeStatus`] was produced in response to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
	Subscribe,
	Heartbeat,
	Leave,
	Reconnection,
}

/// Status categories the subscribe loop recognizes and routes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCategory {
	/// The long-poll call completed normally with a server response.
	Acknowledgment,
	/// The first successful response of a connected episode.
	Connected,
	/// Connectivity was restored after [`StatusCategory::UnexpectedDisconnect`].
	Reconnected,
	/// The reconnection controller exhausted its attempt budget.
	ReconnectionAttemptsExhausted,
	/// A long-poll call timed out; this is normal and not announced
	/// for [`Operation::Subscribe`] -- restart silently.
	Timeout,
	/// The network dropped out from under an outstanding call.
	UnexpectedDisconnect,
	/// The server rejected the request as malformed.
	BadRequest,
	/// The constructed request URI exceeded the server's limit.
	UriTooLong,
	/// The server refused access to one or more of the affected
	/// channels/groups.
	AccessDenied,
	/// The response carried at least `requestMessageCountThreshold`
	/// messages.
	RequestMessageCountExceeded,
}

/// A status event delivered to listeners, or used internally by the
/// subscribe loop to decide how to proceed.
///
/// `client_request`/`origin`/`tls_enabled` describe the request that
/// produced this status; they along with `status_code`, `auth_key`,
/// `operation`, `affected_channels`, and `affected_channel_groups` are
/// the only fields forwarded when a synthetic status (e.g.
/// [`StatusCategory::Connected`]) is derived from an internal one.
#[derive(Clone, Debug)]
pub struct SubscribeStatus {
	pub category: StatusCategory,
	pub error: bool,
	pub status_code: u16,
	pub auth_key: Option<String>,
	pub operation: Operation,
	pub affected_channels: Vec<String>,
	pub affected_channel_groups: Vec<String>,
	pub client_request: Option<String>,
	pub origin: Option<String>,
	pub tls_enabled: bool,
}

impl SubscribeStatus {
	/// Project this status into the public fields forwarded by a
	/// synthetic status. The caller supplies the new `category` and
	/// `error`.
	pub fn project(&self, category: StatusCategory, error: bool) -> SubscribeStatus {
		SubscribeStatus {
			category,
			error,
			status_code: self.status_code,
			auth_key: self.auth_key.clone(),
			operation: self.operation,
			affected_channels: self.affected_channels.clone(),
			affected_channel_groups: self.affected_channel_groups.clone(),
			client_request: self.client_request.clone(),
			origin: self.origin.clone(),
			tls_enabled: self.tls_enabled,
		}
	}
}
