// Session coordinator for small host-authoritative multiplayer rooms.
//
// One participant hosts a room under a short code; up to seven others join
// it by code. The host owns the membership list and relays everything: joins,
// chat, game start, and authoritative state. Clients only ever talk to the
// host. This crate holds the coordinator and the transports it runs on; the
// wire vocabulary and room codes live in `huddle_protocol`.
//
// Module overview:
// - `session.rs`:    `Session`, its lifecycle (`host`, `join`, `poll`,
//                    `destroy`) and gameplay operations.
// - `router.rs`:     per-event and per-message handling (the protocol
//                    state machine), as a second `impl Session` block.
// - `membership.rs`: ordered member list plus the host's name->channel table.
// - `event.rs`:      `SessionEvent`, `EventSink`, `event_channel`.
// - `engine.rs`:     `GameEngine`, the snapshot collaborator for `start_game`.
// - `config.rs`:     `SessionConfig` (limits, timeouts, address prefix).
// - `error.rs`:      `SessionError`, `TransportError`.
// - `transport/`:    the `Transport` trait, an in-memory network for tests
//                    and demos, and a TCP transport.
//
// The coordinator is sans-IO: it never blocks or spawns, and reads time only
// from the `Instant` passed to `poll`. See `multiplayer_tests` for end-to-end
// scenarios across several sessions.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod membership;
mod router;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::SessionConfig;
pub use engine::GameEngine;
pub use error::{SessionError, TransportError};
pub use event::{EventName, EventSink, SessionEvent, event_channel};
pub use membership::{AdmitError, Membership};
pub use session::{ReconnectPolicy, Role, Session, SessionState};
pub use transport::{
    ChannelId, MemoryNetwork, MemoryTransport, OpenMode, TcpConfig, TcpTransport, Transport,
    TransportEvent,
};
