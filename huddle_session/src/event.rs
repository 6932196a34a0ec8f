// Events the coordinator reports to its owner.
//
// A `Session` has exactly one `EventSink`, registered by `host` or `join`.
// The sink is called synchronously from inside `Session::poll` and the public
// operations, so it must return quickly; anything heavy belongs on the other
// side of a queue. `event_channel` builds such a queue: the returned sink
// pushes into an `mpsc` channel and the owner drains the `Receiver` at its
// own pace.
//
// The vocabulary is closed. `EventName` lists the nine names and
// `SessionEvent::name` maps every event onto one of them.

use std::fmt;
use std::sync::mpsc::{self, Receiver};

use huddle_protocol::{ChatMessage, RoomCode};
use serde_json::Value;

/// The fixed set of event names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventName {
    RoomCreated,
    PlayerJoined,
    PlayerLeft,
    Joined,
    GameStart,
    StateUpdate,
    Chat,
    Action,
    Error,
}

impl EventName {
    pub const ALL: [EventName; 9] = [
        EventName::RoomCreated,
        EventName::PlayerJoined,
        EventName::PlayerLeft,
        EventName::Joined,
        EventName::GameStart,
        EventName::StateUpdate,
        EventName::Chat,
        EventName::Action,
        EventName::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::RoomCreated => "room-created",
            EventName::PlayerJoined => "player-joined",
            EventName::PlayerLeft => "player-left",
            EventName::Joined => "joined",
            EventName::GameStart => "game-start",
            EventName::StateUpdate => "state-update",
            EventName::Chat => "chat",
            EventName::Action => "action",
            EventName::Error => "error",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A room or gameplay event, with its payload.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The host's transport endpoint is open and reachable under `code`.
    RoomCreated { code: RoomCode },
    /// Membership grew; `players` is the full snapshot, host first.
    PlayerJoined { players: Vec<String> },
    /// Membership shrank; `players` is the full snapshot, host first.
    PlayerLeft { players: Vec<String> },
    /// The host accepted our join.
    Joined { players: Vec<String> },
    /// The game started; `local_id` is this participant's game identifier.
    GameStart { state: Value, local_id: Value },
    StateUpdate { state: Value },
    Chat(ChatMessage),
    /// Host only: a member sent a game action. `from` is `None` if the
    /// channel had not completed its join.
    Action { from: Option<String>, payload: Value },
    /// Human-readable failure.
    Error { message: String },
}

impl SessionEvent {
    pub fn name(&self) -> EventName {
        match self {
            SessionEvent::RoomCreated { .. } => EventName::RoomCreated,
            SessionEvent::PlayerJoined { .. } => EventName::PlayerJoined,
            SessionEvent::PlayerLeft { .. } => EventName::PlayerLeft,
            SessionEvent::Joined { .. } => EventName::Joined,
            SessionEvent::GameStart { .. } => EventName::GameStart,
            SessionEvent::StateUpdate { .. } => EventName::StateUpdate,
            SessionEvent::Chat(_) => EventName::Chat,
            SessionEvent::Action { .. } => EventName::Action,
            SessionEvent::Error { .. } => EventName::Error,
        }
    }
}

/// The single consumer of a session's events.
pub trait EventSink {
    fn notify(&mut self, event: SessionEvent);
}

impl<F: FnMut(SessionEvent)> EventSink for F {
    fn notify(&mut self, event: SessionEvent) {
        self(event);
    }
}

/// A sink that queues events for the owner to drain from the `Receiver`.
/// Events sent after the receiver is dropped are discarded.
pub fn event_channel() -> (impl EventSink + 'static, Receiver<SessionEvent>) {
    let (tx, rx) = mpsc::channel();
    let sink = move |event: SessionEvent| {
        let _ = tx.send(event);
    };
    (sink, rx)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn names_are_distinct_and_kebab_case() {
        let names: HashSet<&str> = EventName::ALL.iter().map(|n| n.as_str()).collect();
        assert_eq!(names.len(), EventName::ALL.len());
        assert!(names.iter().all(|n| !n.contains('_') && n.to_lowercase() == *n));
    }

    #[test]
    fn channel_sink_preserves_order() {
        let (mut sink, rx) = event_channel();
        sink.notify(SessionEvent::Joined {
            players: vec!["Host".into(), "Ada".into()],
        });
        sink.notify(SessionEvent::Error {
            message: "boom".into(),
        });
        let names: Vec<EventName> = rx.try_iter().map(|e| e.name()).collect();
        assert_eq!(names, vec![EventName::Joined, EventName::Error]);
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (mut sink, rx) = event_channel();
        drop(rx);
        sink.notify(SessionEvent::StateUpdate { state: Value::Null });
    }
}
