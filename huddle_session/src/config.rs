// Session configuration.
//
// `SessionConfig` holds the handful of tunables the coordinator reads: the
// room size cap, how long a joiner waits for its channel to open, how many
// times a host retries a dropped transport, and the address prefix both sides
// use to derive transport addresses from a room code. Every field has a
// default, so a JSON config only needs to name what it overrides.
//
// Host and joiners must agree on `address_prefix`, otherwise joiners derive
// an address nobody listens on and see "room not found".

use std::time::Duration;

use huddle_protocol::{PeerAddress, RoomCode};
use serde::{Deserialize, Serialize};

/// Largest room the protocol supports: the host plus seven members.
pub const DEFAULT_MAX_MEMBERS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum members including the host.
    pub max_members: usize,
    /// How long `join` waits for the host channel to open.
    pub join_timeout_ms: u64,
    /// Automatic transport reconnects a host attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Prepended to the room code to form the host's transport address.
    pub address_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_members: DEFAULT_MAX_MEMBERS,
            join_timeout_ms: 15_000,
            max_reconnect_attempts: 3,
            address_prefix: "huddle-room-".into(),
        }
    }
}

impl SessionConfig {
    /// Parse a (possibly partial) JSON config; missing fields keep defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn host_address(&self, code: &RoomCode) -> PeerAddress {
        PeerAddress::host(&self.address_prefix, code)
    }

    pub fn joiner_address(&self, code: &RoomCode, suffix: &str) -> PeerAddress {
        PeerAddress::joiner(&self.address_prefix, code, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SessionConfig::from_json(r#"{"join_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.join_timeout(), Duration::from_millis(500));
        assert_eq!(config.max_members, DEFAULT_MAX_MEMBERS);
        assert_eq!(config.address_prefix, "huddle-room-");
    }

    #[test]
    fn default_timeout_is_fifteen_seconds() {
        assert_eq!(SessionConfig::default().join_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn host_address_uses_prefix() {
        let config = SessionConfig {
            address_prefix: "test-".into(),
            ..SessionConfig::default()
        };
        let code = RoomCode::parse("ABCDE").unwrap();
        assert_eq!(config.host_address(&code).as_str(), "test-ABCDE");
    }
}
