// Per-event handling for `Session`: the protocol state machine.
//
// `handle_transport_event` is the single entry point. `Session::poll` feeds it
// everything the transport queued, and tests call it directly to script a
// sequence of events. Once the session is terminated, every event is dropped
// here before it can touch any state.
//
// Host side (`route_host`), per inbound message on channel `c`:
//   join   -> admit `c` under the name, reply `joined`, broadcast
//             `player-joined` to every member including the joiner, notify.
//             A full room or a taken name gets an `error` reply instead.
//   action -> notify with the sender's name (if `c` completed its join).
//   chat   -> broadcast to every member including the sender, notify.
//
// Client side (`route_client`), per inbound message on the host channel:
// membership snapshots replace the local view wholesale, `game-start`
// records the local player id, and everything is passed to the sink.
//
// Anything else (unknown types, messages in the wrong direction for the
// local role, data on channels we don't recognise) is dropped at debug level.
//
// Channel closes: on the host, a close removes at most one member and
// broadcasts `player-left` to the remaining ones; a close of a channel that
// never joined leaves no trace. On a client, losing the host channel ends
// the session (back to idle).

use huddle_protocol::WireMessage;
use tracing::{debug, info, warn};

use crate::error::{SessionError, TransportError};
use crate::event::SessionEvent;
use crate::membership::AdmitError;
use crate::session::{Session, SessionState};
use crate::transport::{ChannelId, Transport, TransportEvent};

impl<T: Transport> Session<T> {
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.state == SessionState::Terminated {
            return;
        }
        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Connection { channel } => {
                if self.state.is_host() {
                    debug!(%channel, "inbound channel");
                    self.track_pending(channel);
                }
            }
            TransportEvent::ChannelOpen { channel } => self.on_channel_open(channel),
            TransportEvent::Data { channel, message } => {
                if self.state.is_host() {
                    self.route_host(channel, message);
                } else if self.state.is_client() && self.host_channel == Some(channel) {
                    self.route_client(message);
                } else {
                    debug!(%channel, kind = message.kind(), state = ?self.state, "message dropped");
                }
            }
            TransportEvent::ChannelClose { channel } => self.on_channel_close(channel),
            TransportEvent::ChannelError { channel, error } => self.on_channel_error(channel, error),
            TransportEvent::Error(error) => self.on_transport_error(error),
            TransportEvent::Disconnected => self.on_disconnected(),
        }
    }

    fn on_open(&mut self) {
        if !self.state.is_host() {
            return;
        }
        self.reconnect.reset();
        if !self.announced {
            self.announced = true;
            if let Some(code) = self.room.clone() {
                info!(room = %code, "room open");
                self.notify(SessionEvent::RoomCreated { code });
            }
        }
    }

    /// Host: remember a channel that has not joined yet. A late announce for
    /// a channel that already joined is ignored.
    fn track_pending(&mut self, channel: ChannelId) {
        if self.membership.member_for(channel).is_none() {
            self.pending.insert(channel);
        }
    }

    fn on_channel_open(&mut self, channel: ChannelId) {
        if self.state.is_host() {
            self.track_pending(channel);
            return;
        }
        if self.state == SessionState::Joining && self.host_channel == Some(channel) {
            self.join_deadline = None;
            let join = WireMessage::Join {
                name: self.local_name.clone(),
            };
            self.send_to(channel, &join);
        }
    }

    fn on_channel_close(&mut self, channel: ChannelId) {
        if self.state.is_host() {
            self.pending.remove(&channel);
            let Some(name) = self.membership.remove_channel(channel) else {
                debug!(%channel, "channel closed before joining");
                return;
            };
            info!(player = %name, %channel, "player left");
            let players = self.membership.members().to_vec();
            self.broadcast(&WireMessage::PlayerLeft {
                players: players.clone(),
            });
            self.notify(SessionEvent::PlayerLeft { players });
        } else if self.state.is_client() && self.host_channel == Some(channel) {
            self.abandon_host(&SessionError::HostLost);
        }
    }

    fn on_channel_error(&mut self, channel: ChannelId, error: TransportError) {
        if self.state == SessionState::Joining && self.host_channel == Some(channel) {
            if let Some(code) = self.room.clone() {
                self.abandon_host(&SessionError::from_transport(error, &code));
            }
            return;
        }
        // A close follows if the channel is actually gone.
        debug!(%channel, %error, "channel error");
    }

    fn on_transport_error(&mut self, error: TransportError) {
        let Some(code) = self.room.clone() else {
            return;
        };
        if self.state == SessionState::Idle {
            debug!(%error, "transport error after leaving room");
            return;
        }
        let err = SessionError::from_transport(error, &code);
        if self.state == SessionState::Joining {
            self.abandon_host(&err);
        } else {
            self.report(&err);
        }
    }

    fn on_disconnected(&mut self) {
        if !self.state.is_host() {
            debug!("transport disconnected; host channel may survive");
            return;
        }
        while self.reconnect.try_attempt() {
            let attempt = self.reconnect.attempts;
            match self.transport.reconnect() {
                Ok(()) => {
                    info!(attempt, "transport reconnect requested");
                    return;
                }
                Err(err) => debug!(attempt, error = %err, "transport reconnect failed"),
            }
        }
        warn!(cap = self.reconnect.cap, "giving up on transport reconnects");
    }

    fn route_host(&mut self, channel: ChannelId, message: WireMessage) {
        match message {
            WireMessage::Join { name } => self.admit(channel, name),
            WireMessage::Action { payload } => {
                let from = self.membership.member_for(channel).map(str::to_owned);
                self.notify(SessionEvent::Action { from, payload });
            }
            WireMessage::Chat(chat) => {
                self.broadcast(&WireMessage::Chat(chat.clone()));
                self.notify(SessionEvent::Chat(chat));
            }
            other => debug!(%channel, kind = other.kind(), "host ignores message"),
        }
    }

    fn admit(&mut self, channel: ChannelId, name: String) {
        let max = self.config.max_members;
        match self.membership.admit(name.clone(), channel, max) {
            Ok(()) => {
                self.pending.remove(&channel);
                info!(player = %name, %channel, members = self.membership.len(), "player joined");
                let players = self.membership.members().to_vec();
                self.send_to(
                    channel,
                    &WireMessage::Joined {
                        players: players.clone(),
                    },
                );
                self.broadcast(&WireMessage::PlayerJoined {
                    players: players.clone(),
                });
                self.notify(SessionEvent::PlayerJoined { players });
            }
            Err(AdmitError::AlreadyJoined) => {
                debug!(%channel, player = %name, "repeated join ignored");
            }
            Err(reason) => {
                info!(player = %name, %channel, %reason, "join rejected");
                self.send_to(
                    channel,
                    &WireMessage::Error {
                        message: reason.to_string(),
                    },
                );
            }
        }
    }

    fn route_client(&mut self, message: WireMessage) {
        match message {
            WireMessage::Joined { players } => {
                info!(members = players.len(), "joined room");
                self.state = SessionState::JoinedActive;
                self.join_deadline = None;
                self.membership.replace_snapshot(players.clone());
                self.notify(SessionEvent::Joined { players });
            }
            WireMessage::PlayerJoined { players } => {
                self.membership.replace_snapshot(players.clone());
                self.notify(SessionEvent::PlayerJoined { players });
            }
            WireMessage::PlayerLeft { players } => {
                self.membership.replace_snapshot(players.clone());
                self.notify(SessionEvent::PlayerLeft { players });
            }
            WireMessage::GameStart { state, local_id } => {
                self.local_player_id = Some(local_id.clone());
                self.notify(SessionEvent::GameStart { state, local_id });
            }
            WireMessage::StateUpdate { state } => self.notify(SessionEvent::StateUpdate { state }),
            WireMessage::Chat(chat) => self.notify(SessionEvent::Chat(chat)),
            WireMessage::Error { message } => {
                if self.state == SessionState::Joining {
                    self.abandon_host(&SessionError::Rejected(message));
                } else {
                    self.notify(SessionEvent::Error { message });
                }
            }
            other => debug!(kind = other.kind(), "client ignores message"),
        }
    }
}
