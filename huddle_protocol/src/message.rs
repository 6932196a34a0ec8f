// Wire messages exchanged between a room's host and its members.
//
// One enum, `WireMessage`, covers both directions. On the wire each message is
// a JSON object tagged by a `type` field in kebab-case
// (`{"type":"player-joined","players":[...]}`), which is what the serde
// attributes below produce.
//
// Game state and action payloads are opaque `serde_json::Value`s; the
// session layer forwards them without inspecting their contents, so this crate
// has no dependency on any game logic.
//
// Unknown `type` tags decode to `WireMessage::Unknown` instead of failing, so
// an older peer ignores message kinds it does not understand. Only malformed
// JSON (or a known tag with missing fields) is a decode error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single chat line. `name` is the display name of the author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub name: String,
    pub text: String,
}

/// Every message a host or member can put on a channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireMessage {
    /// Member → host: request to join under a display name.
    Join { name: String },
    /// Host → joiner: accepted; full membership snapshot, host first.
    Joined { players: Vec<String> },
    /// Host → all: someone joined. Carries the full snapshot.
    PlayerJoined { players: Vec<String> },
    /// Host → remaining members: someone left. Carries the full snapshot.
    PlayerLeft { players: Vec<String> },
    /// Member → host: an opaque game action.
    Action {
        #[serde(default)]
        payload: Value,
    },
    /// Either direction; the host echoes every chat to every member.
    Chat(ChatMessage),
    /// Host → member: the game has started.
    GameStart {
        state: Value,
        #[serde(rename = "localId")]
        local_id: Value,
    },
    /// Host → all: new authoritative state.
    StateUpdate { state: Value },
    /// Host → member: a human-readable failure (e.g. "room full").
    Error { message: String },
    /// Any `type` this build does not know about.
    #[serde(other)]
    Unknown,
}

impl WireMessage {
    /// The wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Join { .. } => "join",
            WireMessage::Joined { .. } => "joined",
            WireMessage::PlayerJoined { .. } => "player-joined",
            WireMessage::PlayerLeft { .. } => "player-left",
            WireMessage::Action { .. } => "action",
            WireMessage::Chat(_) => "chat",
            WireMessage::GameStart { .. } => "game-start",
            WireMessage::StateUpdate { .. } => "state-update",
            WireMessage::Error { .. } => "error",
            WireMessage::Unknown => "unknown",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
