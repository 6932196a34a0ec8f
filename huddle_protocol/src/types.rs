// Transport-level addressing shared by hosts and joiners.
//
// A `PeerAddress` is the opaque name a transport endpoint registers under.
// Hosts listen under `prefix + room code` so that anyone holding the code can
// reach them; joiners append a random suffix purely to avoid colliding with
// the host (or with each other) on the same transport.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::room::RoomCode;

/// Opaque transport address (e.g. `huddle-room-K7PQX`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerAddress(pub String);

impl PeerAddress {
    /// Address a host listens under for `code`.
    pub fn host(prefix: &str, code: &RoomCode) -> Self {
        Self(format!("{prefix}{code}"))
    }

    /// Locally unique address for a peer joining `code`.
    pub fn joiner(prefix: &str, code: &RoomCode, suffix: &str) -> Self {
        Self(format!("{prefix}{code}-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_address_is_prefix_plus_code() {
        let code: RoomCode = "K7PQX".parse().unwrap();
        assert_eq!(PeerAddress::host("huddle-room-", &code).as_str(), "huddle-room-K7PQX");
    }

    #[test]
    fn joiner_address_never_equals_host_address() {
        let code: RoomCode = "K7PQX".parse().unwrap();
        let host = PeerAddress::host("p-", &code);
        let joiner = PeerAddress::joiner("p-", &code, "a1b2");
        assert_ne!(host, joiner);
        assert!(joiner.as_str().starts_with(host.as_str()));
    }
}
