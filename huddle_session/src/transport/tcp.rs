// TCP transport: framed JSON over `std::net`, one reader thread per channel.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (hosts only, `TcpListener::accept()` loop): accepts
//   connections, assigns each a `ChannelId`, registers its write half, and
//   reports `Connection` + `ChannelOpen`.
// - **Dial threads** (one per `connect`): perform the blocking TCP connect so
//   `connect` itself returns immediately; on success they register the write
//   half and report `ChannelOpen`, on refusal `PeerUnavailable`.
// - **Reader threads** (one per channel): call `read_frame()` in a loop and
//   report `Data`; on EOF or error they deregister the channel and report
//   `ChannelClose`.
// - **Owner thread**: calls `poll()` to drain the channel, and `send()` to
//   write frames directly on the registered write half. Reader threads never
//   write, so reads and writes on a stream never race.
//
// Addressing: there is no signalling server, so the listen port is derived
// from the `PeerAddress` itself (FNV-1a hash folded into
// `port_base..port_base + port_span`). Anyone who knows the room code can
// compute the host's port. Two codes landing on one port show up as
// `AddressInUse` for the second host, which retries with a new code.
//
// Reconnect: a listener whose `accept` fails marks itself down, reports
// `Disconnected`, and exits. `reconnect` joins that thread and binds again;
// a bind failure (say `AddressInUse`) is returned, so the session's capped
// retry loop sees it instead of a false `Open`.
//
// Shutdown: `destroy` clears `keep_running`, shuts down every stream (which
// unblocks the reader threads with EOF), and joins the listener thread.

use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use huddle_protocol::{FrameError, PeerAddress, WireMessage, read_frame, write_frame};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChannelId, OpenMode, Transport, TransportEvent};
use crate::error::TransportError;

/// How long a dial may take before it is reported as a channel error.
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep between non-blocking accept attempts.
const ACCEPT_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Interface hosts bind to and joiners dial.
    pub host_ip: IpAddr,
    /// First port of the range addresses are hashed into.
    pub port_base: u16,
    /// Size of that range.
    pub port_span: u16,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port_base: 20_000,
            port_span: 40_000,
        }
    }
}

impl TcpConfig {
    /// The socket a host registered under `address` listens on.
    pub fn socket_addr(&self, address: &PeerAddress) -> SocketAddr {
        let span = u64::from(self.port_span.max(1));
        let offset = (fnv1a(address.as_str().as_bytes()) % span) as u16;
        SocketAddr::new(self.host_ip, self.port_base.saturating_add(offset))
    }
}

/// 64-bit FNV-1a. Stable across platforms and builds, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

type Writers = Arc<Mutex<HashMap<ChannelId, BufWriter<TcpStream>>>>;

fn lock(writers: &Writers) -> MutexGuard<'_, HashMap<ChannelId, BufWriter<TcpStream>>> {
    writers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared with background threads.
#[derive(Clone)]
struct Shared {
    events: Sender<TransportEvent>,
    writers: Writers,
    next_channel: Arc<AtomicU32>,
    keep_running: Arc<AtomicBool>,
}

impl Shared {
    fn allocate_channel(&self) -> ChannelId {
        ChannelId(self.next_channel.fetch_add(1, Ordering::SeqCst))
    }

    /// Register the write half of `stream`. The read half is handed to
    /// `spawn_reader` only after the channel has been announced, so `Data`
    /// never overtakes `Connection`/`ChannelOpen`.
    fn register(&self, channel: ChannelId, stream: TcpStream) -> io::Result<BufReader<TcpStream>> {
        let reader = BufReader::new(stream.try_clone()?);
        lock(&self.writers).insert(channel, BufWriter::new(stream));
        Ok(reader)
    }

    fn spawn_reader(&self, channel: ChannelId, reader: BufReader<TcpStream>) {
        let shared = self.clone();
        thread::spawn(move || reader_loop(reader, channel, &shared));
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

/// A transport endpoint speaking framed JSON over TCP.
pub struct TcpTransport {
    config: TcpConfig,
    shared: Shared,
    inbox: Receiver<TransportEvent>,
    local: Option<PeerAddress>,
    /// Opened in `Listen` mode; `reconnect` must re-bind.
    listening: bool,
    /// Set when the current listener thread has stopped (or must stop).
    listener_down: Arc<AtomicBool>,
    listener_thread: Option<JoinHandle<()>>,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        let (events, inbox) = mpsc::channel();
        Self {
            config,
            shared: Shared {
                events,
                writers: Arc::new(Mutex::new(HashMap::new())),
                next_channel: Arc::new(AtomicU32::new(0)),
                keep_running: Arc::new(AtomicBool::new(true)),
            },
            inbox,
            local: None,
            listening: false,
            listener_down: Arc::new(AtomicBool::new(false)),
            listener_thread: None,
        }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn listen(&mut self, local: &PeerAddress) -> Result<(), TransportError> {
        let addr = self.config.socket_addr(local);
        let listener = TcpListener::bind(addr).map_err(|e| match e.kind() {
            io::ErrorKind::AddrInUse => TransportError::AddressInUse(local.to_string()),
            io::ErrorKind::AddrNotAvailable | io::ErrorKind::PermissionDenied => {
                TransportError::Unavailable
            }
            _ => TransportError::Other(e.to_string()),
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::Other(e.to_string()))?;
        debug!(%local, %addr, "listening");

        let down = Arc::new(AtomicBool::new(false));
        self.listener_down = Arc::clone(&down);
        let shared = self.shared.clone();
        self.listener_thread = Some(thread::spawn(move || accept_loop(&listener, &shared, &down)));
        Ok(())
    }

    /// Stop the listener thread the way a failed `accept` does: it exits
    /// and reports `Disconnected`.
    #[cfg(test)]
    fn kill_listener(&mut self) {
        self.listener_down.store(true, Ordering::SeqCst);
        if let Some(handle) = self.listener_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, local: &PeerAddress, mode: OpenMode) -> Result<(), TransportError> {
        if !self.shared.keep_running.load(Ordering::SeqCst) {
            return Err(TransportError::Other("transport destroyed".into()));
        }
        if mode == OpenMode::Listen && self.listener_thread.is_none() {
            self.listen(local)?;
            self.listening = true;
        }
        self.local = Some(local.clone());
        self.shared.emit(TransportEvent::Open);
        Ok(())
    }

    fn connect(&mut self, remote: &PeerAddress) -> Result<ChannelId, TransportError> {
        let channel = self.shared.allocate_channel();
        let addr = self.config.socket_addr(remote);
        let remote = remote.clone();
        let shared = self.shared.clone();
        thread::spawn(move || match TcpStream::connect_timeout(&addr, DIAL_TIMEOUT) {
            Ok(stream) => match shared.register(channel, stream) {
                Ok(reader) => {
                    shared.emit(TransportEvent::ChannelOpen { channel });
                    shared.spawn_reader(channel, reader);
                }
                Err(e) => shared.emit(TransportEvent::ChannelError {
                    channel,
                    error: TransportError::Other(e.to_string()),
                }),
            },
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                shared.emit(TransportEvent::Error(TransportError::PeerUnavailable(
                    remote.to_string(),
                )));
            }
            Err(e) => shared.emit(TransportEvent::ChannelError {
                channel,
                error: TransportError::Other(e.to_string()),
            }),
        });
        Ok(channel)
    }

    fn send(&mut self, channel: ChannelId, message: &WireMessage) -> Result<(), TransportError> {
        let mut writers = lock(&self.shared.writers);
        let writer = writers
            .get_mut(&channel)
            .ok_or(TransportError::ChannelClosed(channel))?;
        write_frame(writer, message).map_err(|e| TransportError::Other(e.to_string()))
    }

    fn close(&mut self, channel: ChannelId) {
        if let Some(writer) = lock(&self.shared.writers).remove(&channel) {
            // The reader thread sees EOF and reports the close.
            let _ = writer.get_ref().shutdown(Shutdown::Both);
        }
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        let Some(local) = self.local.clone() else {
            return Err(TransportError::Other("endpoint was never opened".into()));
        };
        if self.listening && self.listener_down.load(Ordering::SeqCst) {
            // The old thread owns the socket; it must exit before the port
            // can be bound again.
            if let Some(handle) = self.listener_thread.take() {
                let _ = handle.join();
            }
            self.listen(&local)?;
        }
        self.shared.emit(TransportEvent::Open);
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        self.inbox.try_iter().collect()
    }

    fn destroy(&mut self) {
        self.shared.keep_running.store(false, Ordering::SeqCst);
        for (_, writer) in lock(&self.shared.writers).drain() {
            let _ = writer.get_ref().shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.listener_thread.take() {
            let _ = handle.join();
        }
        self.local = None;
        self.listening = false;
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Listener thread: accept until `keep_running` clears. If the listener
/// fails (or `down` is raised) the thread marks itself down, reports
/// `Disconnected`, and exits; `reconnect` binds a new one.
fn accept_loop(listener: &TcpListener, shared: &Shared, down: &AtomicBool) {
    while shared.keep_running.load(Ordering::SeqCst) {
        if down.load(Ordering::SeqCst) {
            shared.emit(TransportEvent::Disconnected);
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let channel = shared.allocate_channel();
                match shared.register(channel, stream) {
                    Ok(reader) => {
                        debug!(%channel, %peer, "accepted");
                        shared.emit(TransportEvent::Connection { channel });
                        shared.emit(TransportEvent::ChannelOpen { channel });
                        shared.spawn_reader(channel, reader);
                    }
                    Err(e) => debug!(%peer, error = %e, "failed to attach accepted stream"),
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_INTERVAL);
            }
            Err(e) => {
                warn!(error = %e, "accept failed; listener stopping");
                down.store(true, Ordering::SeqCst);
                shared.emit(TransportEvent::Disconnected);
                break;
            }
        }
    }
}

/// Reader thread for one channel.
fn reader_loop(mut reader: BufReader<TcpStream>, channel: ChannelId, shared: &Shared) {
    loop {
        match read_frame(&mut reader) {
            Ok(message) => {
                if shared.events.send(TransportEvent::Data { channel, message }).is_err() {
                    break; // Owner dropped the transport.
                }
            }
            Err(e) => {
                if !e.is_eof() && !matches!(e, FrameError::Io(_)) {
                    debug!(%channel, error = %e, "dropping channel after bad frame");
                }
                break;
            }
        }
    }
    if let Some(writer) = lock(&shared.writers).remove(&channel) {
        let _ = writer.get_ref().shutdown(Shutdown::Both);
    }
    shared.emit(TransportEvent::ChannelClose { channel });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_port_is_stable_and_in_range() {
        let config = TcpConfig {
            port_base: 30_000,
            port_span: 100,
            ..TcpConfig::default()
        };
        let address = PeerAddress("huddle-room-ABCDE".into());
        let first = config.socket_addr(&address);
        assert_eq!(first, config.socket_addr(&address));
        assert!((30_000..30_100).contains(&first.port()));
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn send_on_unknown_channel_fails() {
        let mut transport = TcpTransport::new(TcpConfig::default());
        assert_eq!(
            transport.send(ChannelId(9), &WireMessage::Unknown),
            Err(TransportError::ChannelClosed(ChannelId(9)))
        );
    }

    /// Poll until `done` holds for everything drained so far.
    fn drain_until(
        transport: &mut TcpTransport,
        done: impl Fn(&[TransportEvent]) -> bool,
    ) -> Vec<TransportEvent> {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while !done(&events) {
            assert!(std::time::Instant::now() < deadline, "stuck with {events:?}");
            events.extend(transport.poll());
            thread::sleep(Duration::from_millis(5));
        }
        events
    }

    fn listening(address: &PeerAddress, port_base: u16) -> TcpTransport {
        let mut transport = TcpTransport::new(TcpConfig {
            port_base,
            port_span: 1_000,
            ..TcpConfig::default()
        });
        transport.open(address, OpenMode::Listen).unwrap();
        assert_eq!(transport.poll(), vec![TransportEvent::Open]);
        transport
    }

    #[test]
    fn reconnect_rebinds_a_dead_listener() {
        let address = PeerAddress("huddle-room-RB1ND".into());
        let mut host = listening(&address, 51_000);
        let socket = host.config().socket_addr(&address);
        assert!(TcpStream::connect(socket).is_ok());

        host.kill_listener();
        let events = drain_until(&mut host, |e| e.contains(&TransportEvent::Disconnected));
        assert!(events.contains(&TransportEvent::Disconnected));

        host.reconnect().unwrap();
        let events = drain_until(&mut host, |e| e.contains(&TransportEvent::Open));
        assert!(events.contains(&TransportEvent::Open));
        assert!(TcpStream::connect(socket).is_ok(), "host unreachable after reconnect");
        drain_until(&mut host, |e| {
            e.iter().any(|ev| matches!(ev, TransportEvent::Connection { .. }))
        });
    }

    #[test]
    fn reconnect_reports_a_taken_port() {
        let address = PeerAddress("huddle-room-TAKEN".into());
        let mut host = listening(&address, 52_000);
        let socket = host.config().socket_addr(&address);

        host.kill_listener();
        let squatter = TcpListener::bind(socket).unwrap();
        assert_eq!(
            host.reconnect(),
            Err(TransportError::AddressInUse(address.to_string()))
        );
        assert!(!host.poll().contains(&TransportEvent::Open));

        drop(squatter);
        host.reconnect().unwrap();
        assert!(TcpStream::connect(socket).is_ok());
    }

    #[test]
    fn session_reconnect_over_tcp_restores_the_room() {
        use crate::config::SessionConfig;
        use crate::session::Session;
        use huddle_protocol::RoomCode;

        let tcp = TcpConfig {
            port_base: 53_000,
            port_span: 1_000,
            ..TcpConfig::default()
        };
        let code = RoomCode::parse("RECN2").unwrap();
        let config = SessionConfig::default();
        let socket = tcp.socket_addr(&config.host_address(&code));
        let mut session = Session::new(config, TcpTransport::new(tcp));
        session
            .host_with_code("H", code, |_: crate::event::SessionEvent| {})
            .unwrap();
        session.poll(std::time::Instant::now());

        session.transport.kill_listener();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while session.reconnect_attempts() == 0 {
            assert!(std::time::Instant::now() < deadline, "no reconnect attempted");
            session.poll(std::time::Instant::now());
            thread::sleep(Duration::from_millis(5));
        }
        while session.reconnect_attempts() != 0 {
            assert!(std::time::Instant::now() < deadline, "reconnect never reopened");
            session.poll(std::time::Instant::now());
            thread::sleep(Duration::from_millis(5));
        }
        assert!(TcpStream::connect(socket).is_ok());
    }

    #[test]
    fn accepted_channel_is_announced_before_its_data() {
        let address = PeerAddress("huddle-room-SEQNC".into());
        let mut host = listening(&address, 54_000);
        let socket = host.config().socket_addr(&address);

        let mut client = TcpStream::connect(socket).unwrap();
        write_frame(&mut client, &WireMessage::Join { name: "A".into() }).unwrap();

        let events = drain_until(&mut host, |e| {
            e.iter().any(|ev| matches!(ev, TransportEvent::Data { .. }))
        });
        let channel = match events.first() {
            Some(TransportEvent::Connection { channel }) => *channel,
            other => panic!("expected Connection first, got {other:?}"),
        };
        assert_eq!(
            events,
            vec![
                TransportEvent::Connection { channel },
                TransportEvent::ChannelOpen { channel },
                TransportEvent::Data {
                    channel,
                    message: WireMessage::Join { name: "A".into() }
                },
            ]
        );
    }

    #[test]
    fn dial_only_open_reports_open_without_binding() {
        let mut transport = TcpTransport::new(TcpConfig::default());
        transport
            .open(&PeerAddress("huddle-room-ABCDE-x".into()), OpenMode::Dial)
            .unwrap();
        assert_eq!(transport.poll(), vec![TransportEvent::Open]);
    }
}
