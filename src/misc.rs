use core::fmt;

/// Opaque per-channel/group state blob.
///
/// The wire format and schema of this value are a matter between the
/// caller and the server; the engine only ever copies it around.
pub type StateValue = serde_json::Value;

/// A monotonically increasing 64-bit server cursor into the message
/// stream. `0` is the sentinel meaning "start now", used by the
/// subscribe loop to request an initial "connected" response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timetoken(pub i64);

impl Timetoken {
	pub const ZERO: Timetoken = Timetoken(0);

	#[inline]
	pub fn is_zero(&self) -> bool {
		self.0 == 0
	}
}

impl fmt::Display for Timetoken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<i64> for Timetoken {
	fn from(value: i64) -> Self {
		Self(value)
	}
}

/// Suffix appended to a channel name to form its presence-mirror
/// channel, e.g. `"room-1" -> "room-1-pnpres"`.
pub const PRESENCE_SUFFIX: &str = "-pnpres";

pub fn presence_mirror(channel: &str) -> String {
	format!("{channel}{PRESENCE_SUFFIX}")
}
