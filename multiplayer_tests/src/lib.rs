// Test-only harness for multi-session integration tests.
//
// Wraps real `Session`s over a shared `MemoryNetwork` to give a synchronous,
// deterministic API for exercising whole rooms:
// host -> join -> chat / start game / actions / state -> leave -> teardown.
//
// Nothing moves on a `MemoryNetwork` until a session polls, so tests control
// delivery order exactly: `TestNet::settle` polls every peer round-robin
// until the network is quiet, and the join-race property test polls peers in
// an arbitrary order instead. Time is a manual clock (`TestNet::advance`), so
// join timeouts fire exactly when a test says so.
//
// The only test-specific code here is the event recorder and the polling
// helpers. All protocol logic runs through the same `Session` code as a real
// game would use.
//
// See also: `tests/full_pipeline.rs` and `tests/join_race.rs`.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use huddle_protocol::{PeerAddress, RoomCode};
use huddle_session::{
    EventName, MemoryNetwork, MemoryTransport, Session, SessionConfig, SessionError, SessionEvent,
};
use serde_json::{Value, json};

/// Upper bound on polling rounds in `settle`; a room of eight goes quiet in
/// far fewer.
const MAX_SETTLE_ROUNDS: usize = 64;

/// A network, a clock, and the config every peer on it uses.
pub struct TestNet {
    pub network: MemoryNetwork,
    pub config: SessionConfig,
    now: Instant,
}

impl Default for TestNet {
    fn default() -> Self {
        Self::new()
    }
}

impl TestNet {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            network: MemoryNetwork::new(),
            config,
            now: Instant::now(),
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// An idle peer with its own endpoint on this network.
    pub fn peer(&self, name: &str) -> TestPeer {
        TestPeer {
            name: name.to_string(),
            session: Session::new(self.config.clone(), self.network.endpoint()),
            events: Rc::default(),
        }
    }

    /// A peer hosting `code`, with `room-created` already delivered.
    pub fn host(&self, name: &str, code: &str) -> TestPeer {
        let mut peer = self.peer(name);
        let code = RoomCode::parse(code).expect("test room code");
        peer.host(code).expect("host failed");
        peer.session.poll(self.now);
        peer
    }

    /// Start `peer` joining `code`. Nothing is delivered until a poll.
    pub fn join(&self, peer: &mut TestPeer, code: &str) -> Result<(), SessionError> {
        let sink = peer.recorder();
        let name = peer.name.clone();
        peer.session.join(name, code, self.now, sink)
    }

    /// The address the host of `code` listens under.
    pub fn host_address(&self, code: &str) -> PeerAddress {
        let code = RoomCode::parse(code).expect("test room code");
        self.config.host_address(&code)
    }

    /// Poll every peer round-robin until no events are queued anywhere.
    pub fn settle(&self, peers: &mut [&mut TestPeer]) {
        for _ in 0..MAX_SETTLE_ROUNDS {
            for peer in peers.iter_mut() {
                peer.session.poll(self.now);
            }
            if self.network.pending_events() == 0 {
                return;
            }
        }
    }
}

/// One participant: a real session plus a record of every event it emitted.
pub struct TestPeer {
    pub name: String,
    pub session: Session<MemoryTransport>,
    events: Rc<RefCell<Vec<SessionEvent>>>,
}

impl TestPeer {
    fn recorder(&self) -> impl FnMut(SessionEvent) + 'static {
        let events = Rc::clone(&self.events);
        move |event: SessionEvent| events.borrow_mut().push(event)
    }

    pub fn host(&mut self, code: RoomCode) -> Result<RoomCode, SessionError> {
        let sink = self.recorder();
        let name = self.name.clone();
        self.session.host_with_code(name, code, sink)
    }

    /// Host under a generated code.
    pub fn host_any(&mut self) -> Result<RoomCode, SessionError> {
        let sink = self.recorder();
        let name = self.name.clone();
        self.session.host(name, sink)
    }

    pub fn members(&self) -> Vec<String> {
        self.session.members().to_vec()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.borrow().clone()
    }

    /// Remove and return everything recorded so far.
    pub fn take_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn event_names(&self) -> Vec<EventName> {
        self.events.borrow().iter().map(SessionEvent::name).collect()
    }

    /// Messages of every `error` event, in order.
    pub fn errors(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// The most recent membership snapshot this peer was told about.
    pub fn last_snapshot(&self) -> Option<Vec<String>> {
        self.events.borrow().iter().rev().find_map(|e| match e {
            SessionEvent::Joined { players }
            | SessionEvent::PlayerJoined { players }
            | SessionEvent::PlayerLeft { players } => Some(players.clone()),
            _ => None,
        })
    }
}

/// Game engine stand-in: one entry per player with a name-derived id.
pub fn roster_snapshot(players: &[String]) -> Value {
    let players: Vec<Value> = players
        .iter()
        .enumerate()
        .map(|(seat, name)| json!({"id": format!("{name}@{seat}"), "name": name, "seat": seat}))
        .collect();
    json!({"players": players, "turn": 0})
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|n| n.to_string()).collect()
}
