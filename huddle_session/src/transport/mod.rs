// The channel layer the coordinator runs on.
//
// A `Transport` is one local endpoint: it registers under a `PeerAddress`,
// accepts inbound channels (when listening), dials outbound ones, and moves
// `WireMessage`s over them in order. The coordinator never blocks on it:
// operations return immediately, and everything that happens later (a
// channel opening, data arriving, a peer going away) is queued as a
// `TransportEvent` and handed over by `poll()`. `Session::poll` drains that
// queue on the owner's thread, so implementations may use background threads
// internally without the session ever seeing concurrency.
//
// Implementations:
// - `memory.rs`: `MemoryNetwork`, an in-process hub with failure injection.
// - `tcp.rs`:    `TcpTransport`, framed JSON over TCP with reader threads.

pub mod memory;
pub mod tcp;

use std::fmt;

use huddle_protocol::{PeerAddress, WireMessage};

use crate::error::TransportError;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use tcp::{TcpConfig, TcpTransport};

/// Transport-assigned handle for one open (or opening) channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether an endpoint accepts inbound channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Host: reachable under its address.
    Listen,
    /// Joiner: only dials out.
    Dial,
}

/// Something that happened on the transport since the last `poll`.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// The local endpoint is registered (again, after a reconnect).
    Open,
    /// A remote peer dialed us.
    Connection { channel: ChannelId },
    /// A channel (inbound or outbound) is ready for traffic.
    ChannelOpen { channel: ChannelId },
    Data { channel: ChannelId, message: WireMessage },
    ChannelClose { channel: ChannelId },
    ChannelError { channel: ChannelId, error: TransportError },
    /// Endpoint-level failure (address taken, peer unreachable, offline).
    Error(TransportError),
    /// The endpoint lost its registration but open channels may survive.
    Disconnected,
}

pub trait Transport {
    /// Register the local endpoint under `local`. Completion is reported by
    /// `TransportEvent::Open`; immediate failures are returned.
    fn open(&mut self, local: &PeerAddress, mode: OpenMode) -> Result<(), TransportError>;

    /// Dial `remote`. The channel is usable after `ChannelOpen` for it.
    fn connect(&mut self, remote: &PeerAddress) -> Result<ChannelId, TransportError>;

    /// Queue `message` on `channel`, preserving per-channel order.
    fn send(&mut self, channel: ChannelId, message: &WireMessage) -> Result<(), TransportError>;

    /// Close `channel`; the remote side sees `ChannelClose`.
    fn close(&mut self, channel: ChannelId);

    /// Re-register after `Disconnected`.
    fn reconnect(&mut self) -> Result<(), TransportError>;

    /// Drain everything queued since the last call.
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Close every channel and release the endpoint. Idempotent.
    fn destroy(&mut self);
}
