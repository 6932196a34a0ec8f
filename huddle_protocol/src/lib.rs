// huddle_protocol: wire protocol for host-authoritative rooms.
//
// This crate defines what travels between a room's host and its members and
// how peers find each other. It is shared by every transport and by the
// session coordinator (`huddle_session`), and knows nothing about channels,
// timers, or game logic.
//
// Module overview:
// - `room.rs`:     `RoomCode`, 5-character unambiguous codes, generation and
//                  case-insensitive parsing.
// - `types.rs`:    `PeerAddress`, transport addresses derived from a room
//                  code (host) or code plus random suffix (joiner).
// - `message.rs`:  `WireMessage`, the closed set of message kinds, tagged by
//                  `type` in JSON, with an `Unknown` catch-all.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then JSON payload.
//
// Design decisions:
// - **JSON serialization.** Game payloads are already `serde_json::Value`s,
//   and JSON keeps the wire readable when debugging a room by hand.
// - **Forward-compatible decoding.** Unknown message kinds are a variant, not
//   an error, so mixed-version rooms degrade to ignoring new features.
// - **No async runtime.** Framing uses `std::io::Read`/`Write`, compatible
//   with blocking TCP streams and in-memory buffers alike.

pub mod framing;
pub mod message;
pub mod room;
pub mod types;

pub use framing::{FrameError, MAX_FRAME_SIZE, read_frame, write_frame};
pub use message::{ChatMessage, WireMessage};
pub use room::{ROOM_CODE_ALPHABET, ROOM_CODE_LEN, RoomCode, RoomCodeError};
pub use types::PeerAddress;
