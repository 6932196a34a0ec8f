// The session coordinator: one room, seen from one participant.
//
// `Session` is the central data structure of this crate. It owns the
// transport endpoint, the room code, the membership view, and the single
// event sink, and moves through `SessionState`:
//
//   Idle ──host()──▶ HostingWaiting ──start_game()──▶ HostingActive
//   Idle ──join()──▶ Joining ──joined──▶ JoinedActive
//   Joining ──timeout / rejection / transport error / host lost──▶ Idle
//   any ──destroy()──▶ Terminated
//
// All mutation happens through `&mut self` on the owner's thread. Transport
// activity arrives as `TransportEvent`s drained by `poll`, which hands each
// one to the router (`router.rs`) and then checks the join deadline against
// the caller's clock. Nothing here blocks or spawns.
//
// Sending: `send_to` and `broadcast` swallow per-channel send failures (they
// are logged at debug). A broken channel will produce its own close event,
// which is where membership is actually updated.
//
// See also: `membership.rs` for the member list invariants, `router.rs` for
// per-message handling, `transport/` for the channel layer.

use std::collections::BTreeSet;
use std::time::Instant;

use huddle_protocol::{ChatMessage, RoomCode, WireMessage};
use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::engine::{GameEngine, player_ids};
use crate::error::SessionError;
use crate::event::{EventSink, SessionEvent};
use crate::membership::Membership;
use crate::transport::{ChannelId, OpenMode, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    HostingWaiting,
    HostingActive,
    Joining,
    JoinedActive,
    Terminated,
}

impl SessionState {
    pub fn is_host(self) -> bool {
        matches!(self, SessionState::HostingWaiting | SessionState::HostingActive)
    }

    pub fn is_client(self) -> bool {
        matches!(self, SessionState::Joining | SessionState::JoinedActive)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

/// Host-side bookkeeping for automatic transport reconnects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub cap: u32,
}

impl ReconnectPolicy {
    pub fn new(cap: u32) -> Self {
        Self { attempts: 0, cap }
    }

    /// Claim one attempt; false once the cap is spent.
    pub fn try_attempt(&mut self) -> bool {
        if self.attempts >= self.cap {
            return false;
        }
        self.attempts += 1;
        true
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

pub struct Session<T: Transport> {
    pub(crate) config: SessionConfig,
    pub(crate) transport: T,
    pub(crate) state: SessionState,
    sink: Option<Box<dyn EventSink>>,
    pub(crate) room: Option<RoomCode>,
    pub(crate) local_name: String,
    pub(crate) membership: Membership,
    /// Host: inbound channels that have not sent `join` yet.
    pub(crate) pending: BTreeSet<ChannelId>,
    /// Client: the one channel to the host.
    pub(crate) host_channel: Option<ChannelId>,
    pub(crate) join_deadline: Option<Instant>,
    pub(crate) local_player_id: Option<Value>,
    pub(crate) reconnect: ReconnectPolicy,
    /// Host: `room-created` has been reported for this room.
    pub(crate) announced: bool,
}

impl<T: Transport> Session<T> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        let reconnect = ReconnectPolicy::new(config.max_reconnect_attempts);
        Self {
            config,
            transport,
            state: SessionState::Idle,
            sink: None,
            room: None,
            local_name: String::new(),
            membership: Membership::default(),
            pending: BTreeSet::new(),
            host_channel: None,
            join_deadline: None,
            local_player_id: None,
            reconnect,
            announced: false,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open a new room under a freshly generated code.
    pub fn host(
        &mut self,
        name: impl Into<String>,
        sink: impl EventSink + 'static,
    ) -> Result<RoomCode, SessionError> {
        let code = RoomCode::generate(&mut rand::thread_rng());
        self.host_with_code(name, code, sink)
    }

    /// Open a new room under `code`. On `AddressInUse` the caller may retry
    /// with another code.
    pub fn host_with_code(
        &mut self,
        name: impl Into<String>,
        code: RoomCode,
        sink: impl EventSink + 'static,
    ) -> Result<RoomCode, SessionError> {
        self.ensure_idle()?;
        self.sink = Some(Box::new(sink));
        let address = self.config.host_address(&code);
        if let Err(err) = self.transport.open(&address, OpenMode::Listen) {
            let err = SessionError::from_transport(err, &code);
            self.report(&err);
            return Err(err);
        }

        let name = name.into();
        info!(room = %code, host = %name, "hosting room");
        self.state = SessionState::HostingWaiting;
        self.room = Some(code.clone());
        self.membership = Membership::with_host(name.clone());
        self.local_name = name;
        self.local_player_id = None;
        self.announced = false;
        self.reconnect.reset();
        Ok(code)
    }

    /// Dial the host of `code` (case-insensitive). The join completes when
    /// the sink receives `joined`; it fails with `ConnectionTimeout` if the
    /// channel has not opened by `now + join_timeout`.
    pub fn join(
        &mut self,
        name: impl Into<String>,
        code: &str,
        now: Instant,
        sink: impl EventSink + 'static,
    ) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.sink = Some(Box::new(sink));
        let code = match RoomCode::parse(code) {
            Ok(code) => code,
            Err(err) => {
                let err = SessionError::from(err);
                self.report(&err);
                return Err(err);
            }
        };

        let suffix = format!("{:08x}", rand::thread_rng().gen_range(0..=u32::MAX));
        let local = self.config.joiner_address(&code, &suffix);
        let host = self.config.host_address(&code);
        let channel = match self
            .transport
            .open(&local, OpenMode::Dial)
            .and_then(|()| self.transport.connect(&host))
        {
            Ok(channel) => channel,
            Err(err) => {
                let err = SessionError::from_transport(err, &code);
                self.report(&err);
                return Err(err);
            }
        };

        let name = name.into();
        info!(room = %code, name = %name, %channel, "joining room");
        self.state = SessionState::Joining;
        self.room = Some(code);
        self.local_name = name;
        self.membership = Membership::default();
        self.host_channel = Some(channel);
        self.join_deadline = Some(now + self.config.join_timeout());
        self.local_player_id = None;
        Ok(())
    }

    /// Drain transport events, route each, then check the join deadline.
    pub fn poll(&mut self, now: Instant) {
        if self.state == SessionState::Terminated {
            return;
        }
        for event in self.transport.poll() {
            self.handle_transport_event(event);
        }
        self.check_join_deadline(now);
    }

    /// Close every channel, release the transport, and stop reacting to it.
    /// Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        let channels: Vec<ChannelId> = self
            .membership
            .channels()
            .into_iter()
            .chain(self.pending.iter().copied())
            .chain(self.host_channel)
            .collect();
        for channel in channels {
            self.transport.close(channel);
        }
        self.transport.destroy();

        info!(room = ?self.room.as_ref().map(RoomCode::as_str), "session destroyed");
        self.state = SessionState::Terminated;
        self.sink = None;
        self.membership = Membership::default();
        self.pending.clear();
        self.host_channel = None;
        self.join_deadline = None;
    }

    // -----------------------------------------------------------------------
    // Gameplay
    // -----------------------------------------------------------------------

    /// Host only: snapshot the game for the current members and send each
    /// member its `game-start`. Ignored on clients.
    pub fn start_game(&mut self, engine: &dyn GameEngine) {
        if !self.state.is_host() {
            debug!(state = ?self.state, "start_game ignored: not hosting");
            return;
        }
        let players = self.membership.members().to_vec();
        let snapshot = engine.create_snapshot(&players);
        let ids = match player_ids(&snapshot, players.len()) {
            Ok(ids) => ids,
            Err(err) => {
                self.report(&err);
                return;
            }
        };

        let mut ids = ids.into_iter();
        let host_id = ids.next().unwrap_or(Value::Null);
        let targets: Vec<(ChannelId, Value)> = players
            .iter()
            .skip(1)
            .zip(ids)
            .filter_map(|(name, id)| self.membership.channel_of(name).map(|ch| (ch, id)))
            .collect();
        for (channel, local_id) in targets {
            self.send_to(
                channel,
                &WireMessage::GameStart {
                    state: snapshot.clone(),
                    local_id,
                },
            );
        }

        info!(players = players.len(), "game started");
        self.state = SessionState::HostingActive;
        self.local_player_id = Some(host_id.clone());
        self.notify(SessionEvent::GameStart {
            state: snapshot,
            local_id: host_id,
        });
    }

    /// Client: forward an action to the host. Host: no-op, the host applies
    /// its own actions to the game engine directly.
    pub fn send_action(&mut self, payload: Value) {
        match self.joined_host_channel() {
            Some(channel) => self.send_to(channel, &WireMessage::Action { payload }),
            None => debug!(state = ?self.state, "send_action ignored"),
        }
    }

    /// Host: broadcast and show locally. Client: send to the host, which
    /// echoes it back to everyone including us.
    pub fn send_chat(&mut self, text: impl Into<String>) {
        let chat = ChatMessage {
            name: self.local_name.clone(),
            text: text.into(),
        };
        if self.state.is_host() {
            self.broadcast(&WireMessage::Chat(chat.clone()));
            self.notify(SessionEvent::Chat(chat));
        } else if let Some(channel) = self.joined_host_channel() {
            self.send_to(channel, &WireMessage::Chat(chat));
        } else {
            debug!(state = ?self.state, "send_chat ignored");
        }
    }

    /// Host only: push new authoritative state to every member.
    pub fn broadcast_state(&mut self, state: Value) {
        if self.state.is_host() {
            self.broadcast(&WireMessage::StateUpdate { state });
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        if self.state.is_host() {
            Some(Role::Host)
        } else if self.state.is_client() {
            Some(Role::Client)
        } else {
            None
        }
    }

    pub fn room_code(&self) -> Option<&RoomCode> {
        self.room.as_ref()
    }

    /// Current membership snapshot, host first. Empty until a client joins.
    pub fn members(&self) -> &[String] {
        self.membership.members()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// This participant's game identifier, once the game has started.
    pub fn local_player_id(&self) -> Option<&Value> {
        self.local_player_id.as_ref()
    }

    /// Client: the channel to the host.
    pub fn host_channel(&self) -> Option<ChannelId> {
        self.host_channel
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect.attempts
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Internals shared with the router
    // -----------------------------------------------------------------------

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Idle {
            Ok(())
        } else {
            Err(SessionError::InvalidState(self.state))
        }
    }

    fn joined_host_channel(&self) -> Option<ChannelId> {
        if self.state == SessionState::JoinedActive {
            self.host_channel
        } else {
            None
        }
    }

    fn check_join_deadline(&mut self, now: Instant) {
        if self.state != SessionState::Joining {
            return;
        }
        if self.join_deadline.is_some_and(|deadline| now >= deadline) {
            if let Some(code) = self.room.clone() {
                self.abandon_host(&SessionError::ConnectionTimeout(code));
            }
        }
    }

    /// Give up on the host (join failed or channel lost): report `err`, close
    /// the host channel, and return to idle.
    pub(crate) fn abandon_host(&mut self, err: &SessionError) {
        self.report(err);
        if let Some(channel) = self.host_channel.take() {
            self.transport.close(channel);
        }
        self.join_deadline = None;
        self.membership = Membership::default();
        self.state = SessionState::Idle;
    }

    /// Send to one channel; failures are isolated to that channel.
    pub(crate) fn send_to(&mut self, channel: ChannelId, message: &WireMessage) {
        if let Err(err) = self.transport.send(channel, message) {
            debug!(%channel, kind = message.kind(), error = %err, "send failed; dropped");
        }
    }

    /// Send to every member channel in join order.
    pub(crate) fn broadcast(&mut self, message: &WireMessage) {
        for channel in self.membership.channels() {
            self.send_to(channel, message);
        }
    }

    pub(crate) fn notify(&mut self, event: SessionEvent) {
        if let Some(sink) = self.sink.as_mut() {
            sink.notify(event);
        }
    }

    pub(crate) fn report(&mut self, err: &SessionError) {
        warn!(error = %err, "session error");
        self.notify(SessionEvent::Error {
            message: err.to_string(),
        });
    }
}
