// Shared fixtures for the unit tests in this crate.
//
// `FakeTransport` records every call the session makes and replays whatever
// events a test queues, so routing can be driven one event at a time without
// a network. Integration tests across real transports live in
// `multiplayer_tests`.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use huddle_protocol::{PeerAddress, RoomCode, WireMessage};

use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::event::{EventName, EventSink, SessionEvent};
use crate::session::Session;
use crate::transport::{ChannelId, OpenMode, Transport, TransportEvent};

/// Channel id the fake hands out for every outbound dial.
pub const DIALED: ChannelId = ChannelId(100);

#[derive(Default)]
pub struct FakeTransport {
    pub opened: Vec<(PeerAddress, OpenMode)>,
    pub dialed: Vec<PeerAddress>,
    pub sent: Vec<(ChannelId, WireMessage)>,
    pub closed: Vec<ChannelId>,
    pub destroyed: u32,
    pub reconnects: u32,
    pub open_result: Option<TransportError>,
    pub reconnect_result: Option<TransportError>,
    pub broken: BTreeSet<ChannelId>,
    pub queued: VecDeque<TransportEvent>,
}

impl FakeTransport {
    /// Messages sent on `channel`, in order.
    pub fn sent_on(&self, channel: ChannelId) -> Vec<WireMessage> {
        self.sent
            .iter()
            .filter(|(ch, _)| *ch == channel)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Transport for FakeTransport {
    fn open(&mut self, local: &PeerAddress, mode: OpenMode) -> Result<(), TransportError> {
        if let Some(err) = self.open_result.clone() {
            return Err(err);
        }
        self.opened.push((local.clone(), mode));
        Ok(())
    }

    fn connect(&mut self, remote: &PeerAddress) -> Result<ChannelId, TransportError> {
        self.dialed.push(remote.clone());
        Ok(DIALED)
    }

    fn send(&mut self, channel: ChannelId, message: &WireMessage) -> Result<(), TransportError> {
        if self.broken.contains(&channel) {
            return Err(TransportError::ChannelClosed(channel));
        }
        self.sent.push((channel, message.clone()));
        Ok(())
    }

    fn close(&mut self, channel: ChannelId) {
        self.closed.push(channel);
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.reconnects += 1;
        match self.reconnect_result.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        self.queued.drain(..).collect()
    }

    fn destroy(&mut self) {
        self.destroyed += 1;
    }
}

pub type Events = Rc<RefCell<Vec<SessionEvent>>>;

pub fn recorder() -> (Events, impl EventSink + 'static) {
    let events: Events = Rc::default();
    let sink_events = Rc::clone(&events);
    let sink = move |event: SessionEvent| sink_events.borrow_mut().push(event);
    (events, sink)
}

pub fn names(events: &Events) -> Vec<EventName> {
    events.borrow().iter().map(SessionEvent::name).collect()
}

pub fn code() -> RoomCode {
    RoomCode::parse("ABCDE").unwrap()
}

pub fn hosting(name: &str) -> (Session<FakeTransport>, Events) {
    let mut session = Session::new(SessionConfig::default(), FakeTransport::default());
    let (events, sink) = recorder();
    session.host_with_code(name, code(), sink).unwrap();
    (session, events)
}

/// A client whose channel to the host is open and whose `join` is sent.
pub fn joining(name: &str) -> (Session<FakeTransport>, Events) {
    let mut session = Session::new(SessionConfig::default(), FakeTransport::default());
    let (events, sink) = recorder();
    session
        .join(name, code().as_str(), std::time::Instant::now(), sink)
        .unwrap();
    session.handle_transport_event(TransportEvent::ChannelOpen { channel: DIALED });
    (session, events)
}

/// Walk an inbound channel through connect, open and `join` on a host.
pub fn admit(session: &mut Session<FakeTransport>, channel: u32, name: &str) {
    let channel = ChannelId(channel);
    session.handle_transport_event(TransportEvent::Connection { channel });
    session.handle_transport_event(TransportEvent::ChannelOpen { channel });
    session.handle_transport_event(TransportEvent::Data {
        channel,
        message: WireMessage::Join { name: name.into() },
    });
}

pub fn players(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
