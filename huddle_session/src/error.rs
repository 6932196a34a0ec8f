// Error types for the session coordinator and its transports.
//
// `TransportError` is what a `Transport` implementation reports, either as a
// synchronous `Err` or inside `TransportEvent::Error`. `SessionError` is what
// the coordinator surfaces to its owner: public operations return it, and its
// `Display` text is what the event sink receives in an `error` event.
//
// The mapping between the two depends on context (a `PeerUnavailable` while
// joining means "room not found"), so it lives in `SessionError::from_transport`
// rather than in a blanket `From` impl.

use huddle_protocol::{RoomCode, RoomCodeError};
use thiserror::Error;

use crate::session::SessionState;
use crate::transport::ChannelId;

/// Failures reported by a transport implementation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No usable network stack.
    #[error("network unavailable")]
    Unavailable,
    /// Another endpoint already holds this address.
    #[error("address already in use: {0}")]
    AddressInUse(String),
    /// Nobody is registered under the remote address.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),
    /// The channel was closed or never opened.
    #[error("channel {0} is closed")]
    ChannelClosed(ChannelId),
    #[error("transport error: {0}")]
    Other(String),
}

/// Failures the coordinator reports to its owner.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session is {0:?}; host or join needs an idle session")]
    InvalidState(SessionState),
    #[error("invalid room code: {0}")]
    InvalidRoomCode(#[from] RoomCodeError),
    #[error("network unavailable")]
    TransportUnavailable,
    #[error("room code {0} is already in use, try another")]
    AddressInUse(RoomCode),
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),
    #[error("timed out connecting to room {0}")]
    ConnectionTimeout(RoomCode),
    /// The host refused the join (room full, name taken, ...).
    #[error("{0}")]
    Rejected(String),
    #[error("lost connection to host")]
    HostLost,
    #[error("game engine snapshot has no id for player {0}")]
    MissingPlayerId(usize),
    #[error(transparent)]
    Transport(TransportError),
}

impl SessionError {
    /// Translate a transport failure in the context of `room`.
    pub fn from_transport(err: TransportError, room: &RoomCode) -> Self {
        match err {
            TransportError::Unavailable => SessionError::TransportUnavailable,
            TransportError::AddressInUse(_) => SessionError::AddressInUse(room.clone()),
            TransportError::PeerUnavailable(_) => SessionError::RoomNotFound(room.clone()),
            other => SessionError::Transport(other),
        }
    }

    /// Whether the caller can reasonably try again (new code, later join).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::AddressInUse(_)
                | SessionError::ConnectionTimeout(_)
                | SessionError::Rejected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_unavailable_reads_as_room_not_found() {
        let code = RoomCode::parse("ABCDE").unwrap();
        let err = SessionError::from_transport(TransportError::PeerUnavailable("x".into()), &code);
        assert_eq!(err, SessionError::RoomNotFound(code));
        assert_eq!(err.to_string(), "room ABCDE not found");
    }

    #[test]
    fn collisions_are_retryable_but_outages_are_not() {
        let code = RoomCode::parse("ABCDE").unwrap();
        assert!(SessionError::from_transport(TransportError::AddressInUse("x".into()), &code).is_retryable());
        assert!(!SessionError::from_transport(TransportError::Unavailable, &code).is_retryable());
    }

    #[test]
    fn rejection_text_is_passed_through() {
        assert_eq!(SessionError::Rejected("room full".into()).to_string(), "room full");
    }
}
