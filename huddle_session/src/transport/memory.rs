// In-process transport: every endpoint lives in one `MemoryNetwork` hub.
//
// The hub plays the part of both the signalling service (address
// registration and lookup) and the data channels themselves. Each endpoint
// owns an inbox of `TransportEvent`s; operations on one endpoint push events
// into the inboxes of others, and nothing moves until the owning session
// calls `poll`. That makes delivery order a direct function of the order in
// which tests poll their peers, which is how the join-race tests steer
// interleavings.
//
// Every message is encoded to JSON on `send` and decoded on delivery, so the
// wire schema (including the `Unknown` fallback) is exercised even though no
// bytes leave the process.
//
// Failure injection, used by tests:
// - `set_offline`: `open`, `connect`, and `reconnect` fail with `Unavailable`.
// - `drop_registration`: the endpoint loses its address and sees
//   `Disconnected`; its channels stay up.
// - `stall`: dials to an address never open, for join-timeout tests.
// - `half_close`: silently drop one end of a channel so sends from the other
//   end fail, for send-isolation tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use huddle_protocol::{PeerAddress, WireMessage};

use super::{ChannelId, OpenMode, Transport, TransportEvent};
use crate::error::TransportError;

type EndpointId = u32;

/// Shared in-process network. Clones refer to the same hub.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

#[derive(Default)]
struct Hub {
    next_endpoint: EndpointId,
    next_channel: u32,
    offline: bool,
    addresses: HashMap<PeerAddress, EndpointId>,
    endpoints: HashMap<EndpointId, Endpoint>,
    links: HashMap<ChannelId, LinkEnd>,
    stalled: HashSet<PeerAddress>,
}

#[derive(Default)]
struct Endpoint {
    address: Option<PeerAddress>,
    inbox: VecDeque<TransportEvent>,
}

struct LinkEnd {
    owner: EndpointId,
    peer: Option<ChannelId>,
}

impl Hub {
    fn push(&mut self, endpoint: EndpointId, event: TransportEvent) {
        if let Some(ep) = self.endpoints.get_mut(&endpoint) {
            ep.inbox.push_back(event);
        }
    }

    fn allocate_channel(&mut self, owner: EndpointId) -> ChannelId {
        let channel = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.links.insert(channel, LinkEnd { owner, peer: None });
        channel
    }

    /// Remove both ends of `channel`, notifying each owner.
    fn unlink(&mut self, channel: ChannelId) {
        let Some(end) = self.links.remove(&channel) else {
            return;
        };
        self.push(end.owner, TransportEvent::ChannelClose { channel });
        let Some(peer) = end.peer else {
            return;
        };
        if let Some(peer_end) = self.links.remove(&peer) {
            self.push(peer_end.owner, TransportEvent::ChannelClose { channel: peer });
        }
    }

    fn check_alive(&self, endpoint: EndpointId) -> Result<(), TransportError> {
        if self.endpoints.contains_key(&endpoint) {
            Ok(())
        } else {
            Err(TransportError::Other("endpoint destroyed".into()))
        }
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a fresh, unregistered endpoint on this network.
    pub fn endpoint(&self) -> MemoryTransport {
        let mut hub = self.lock();
        let id = hub.next_endpoint;
        hub.next_endpoint += 1;
        hub.endpoints.insert(id, Endpoint::default());
        MemoryTransport {
            id,
            network: self.clone(),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Drop the registration of whoever holds `address` and tell it so.
    /// Returns false if nobody holds the address.
    pub fn drop_registration(&self, address: &PeerAddress) -> bool {
        let mut hub = self.lock();
        match hub.addresses.remove(address) {
            Some(owner) => {
                hub.push(owner, TransportEvent::Disconnected);
                true
            }
            None => false,
        }
    }

    /// Make every future dial to `address` hang without opening.
    pub fn stall(&self, address: PeerAddress) {
        self.lock().stalled.insert(address);
    }

    /// Silently remove the far end of `channel`: the near end stays
    /// registered but every send on it fails.
    pub fn half_close(&self, channel: ChannelId) {
        let mut hub = self.lock();
        if let Some(peer) = hub.links.get(&channel).and_then(|end| end.peer) {
            hub.links.remove(&peer);
        }
    }

    pub fn is_registered(&self, address: &PeerAddress) -> bool {
        self.lock().addresses.contains_key(address)
    }

    /// Events queued across all endpoints and not yet polled.
    pub fn pending_events(&self) -> usize {
        self.lock().endpoints.values().map(|ep| ep.inbox.len()).sum()
    }

    /// Channel ends currently alive on the network.
    pub fn open_channel_ends(&self) -> usize {
        self.lock().links.len()
    }
}

/// One endpoint on a `MemoryNetwork`.
pub struct MemoryTransport {
    id: EndpointId,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    fn owns(hub: &Hub, id: EndpointId, channel: ChannelId) -> bool {
        hub.links.get(&channel).is_some_and(|end| end.owner == id)
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, local: &PeerAddress, _mode: OpenMode) -> Result<(), TransportError> {
        let mut guard = self.network.lock();
        let hub = &mut *guard;
        hub.check_alive(self.id)?;
        if hub.offline {
            return Err(TransportError::Unavailable);
        }
        if hub.addresses.get(local).is_some_and(|owner| *owner != self.id) {
            return Err(TransportError::AddressInUse(local.to_string()));
        }
        let previous = hub
            .endpoints
            .get_mut(&self.id)
            .and_then(|ep| ep.address.replace(local.clone()));
        if let Some(previous) = previous {
            if hub.addresses.get(&previous) == Some(&self.id) {
                hub.addresses.remove(&previous);
            }
        }
        hub.addresses.insert(local.clone(), self.id);
        hub.push(self.id, TransportEvent::Open);
        Ok(())
    }

    fn connect(&mut self, remote: &PeerAddress) -> Result<ChannelId, TransportError> {
        let mut guard = self.network.lock();
        let hub = &mut *guard;
        hub.check_alive(self.id)?;
        if hub.offline {
            return Err(TransportError::Unavailable);
        }
        let local_channel = hub.allocate_channel(self.id);
        if hub.stalled.contains(remote) {
            return Ok(local_channel);
        }
        let Some(target) = hub.addresses.get(remote).copied() else {
            hub.links.remove(&local_channel);
            hub.push(
                self.id,
                TransportEvent::Error(TransportError::PeerUnavailable(remote.to_string())),
            );
            return Ok(local_channel);
        };
        let remote_channel = hub.allocate_channel(target);
        if let Some(end) = hub.links.get_mut(&local_channel) {
            end.peer = Some(remote_channel);
        }
        if let Some(end) = hub.links.get_mut(&remote_channel) {
            end.peer = Some(local_channel);
        }
        hub.push(target, TransportEvent::Connection { channel: remote_channel });
        hub.push(target, TransportEvent::ChannelOpen { channel: remote_channel });
        hub.push(self.id, TransportEvent::ChannelOpen { channel: local_channel });
        Ok(local_channel)
    }

    fn send(&mut self, channel: ChannelId, message: &WireMessage) -> Result<(), TransportError> {
        let mut hub = self.network.lock();
        if !Self::owns(&hub, self.id, channel) {
            return Err(TransportError::ChannelClosed(channel));
        }
        let peer = hub
            .links
            .get(&channel)
            .and_then(|end| end.peer)
            .ok_or(TransportError::ChannelClosed(channel))?;
        let owner = hub
            .links
            .get(&peer)
            .map(|end| end.owner)
            .ok_or(TransportError::ChannelClosed(channel))?;
        let bytes = message
            .to_json()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        let delivered =
            WireMessage::from_json(&bytes).map_err(|e| TransportError::Other(e.to_string()))?;
        hub.push(
            owner,
            TransportEvent::Data {
                channel: peer,
                message: delivered,
            },
        );
        Ok(())
    }

    fn close(&mut self, channel: ChannelId) {
        let mut hub = self.network.lock();
        if Self::owns(&hub, self.id, channel) {
            hub.unlink(channel);
        }
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        let mut guard = self.network.lock();
        let hub = &mut *guard;
        hub.check_alive(self.id)?;
        if hub.offline {
            return Err(TransportError::Unavailable);
        }
        let address = hub
            .endpoints
            .get(&self.id)
            .and_then(|ep| ep.address.clone())
            .ok_or_else(|| TransportError::Other("endpoint was never opened".into()))?;
        if hub.addresses.get(&address).is_some_and(|owner| *owner != self.id) {
            return Err(TransportError::AddressInUse(address.to_string()));
        }
        hub.addresses.insert(address, self.id);
        hub.push(self.id, TransportEvent::Open);
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        self.network
            .lock()
            .endpoints
            .get_mut(&self.id)
            .map(|ep| ep.inbox.drain(..).collect())
            .unwrap_or_default()
    }

    fn destroy(&mut self) {
        let mut guard = self.network.lock();
        let hub = &mut *guard;
        let owned: Vec<ChannelId> = hub
            .links
            .iter()
            .filter(|(_, end)| end.owner == self.id)
            .map(|(channel, _)| *channel)
            .collect();
        for channel in owned {
            hub.unlink(channel);
        }
        hub.addresses.retain(|_, owner| *owner != self.id);
        hub.endpoints.remove(&self.id);
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> PeerAddress {
        PeerAddress(s.into())
    }

    fn opened(network: &MemoryNetwork, address: &str, mode: OpenMode) -> MemoryTransport {
        let mut endpoint = network.endpoint();
        endpoint.open(&addr(address), mode).unwrap();
        assert_eq!(endpoint.poll(), vec![TransportEvent::Open]);
        endpoint
    }

    #[test]
    fn dial_opens_both_ends_and_carries_data() {
        let network = MemoryNetwork::new();
        let mut host = opened(&network, "room-A", OpenMode::Listen);
        let mut guest = opened(&network, "room-A-x", OpenMode::Dial);

        let out = guest.connect(&addr("room-A")).unwrap();
        assert_eq!(guest.poll(), vec![TransportEvent::ChannelOpen { channel: out }]);
        let inbound = match host.poll().as_slice() {
            [
                TransportEvent::Connection { channel },
                TransportEvent::ChannelOpen { channel: again },
            ] if channel == again => *channel,
            other => panic!("unexpected events: {other:?}"),
        };

        let msg = WireMessage::Join { name: "Ada".into() };
        guest.send(out, &msg).unwrap();
        assert_eq!(
            host.poll(),
            vec![TransportEvent::Data {
                channel: inbound,
                message: msg
            }]
        );
    }

    #[test]
    fn dialing_nobody_reports_peer_unavailable() {
        let network = MemoryNetwork::new();
        let mut guest = opened(&network, "g", OpenMode::Dial);
        guest.connect(&addr("nobody")).unwrap();
        assert_eq!(
            guest.poll(),
            vec![TransportEvent::Error(TransportError::PeerUnavailable(
                "nobody".into()
            ))]
        );
    }

    #[test]
    fn second_owner_of_an_address_is_refused() {
        let network = MemoryNetwork::new();
        let _first = opened(&network, "room-A", OpenMode::Listen);
        let mut second = network.endpoint();
        assert_eq!(
            second.open(&addr("room-A"), OpenMode::Listen),
            Err(TransportError::AddressInUse("room-A".into()))
        );
    }

    #[test]
    fn offline_network_refuses_open() {
        let network = MemoryNetwork::new();
        network.set_offline(true);
        let mut endpoint = network.endpoint();
        assert_eq!(
            endpoint.open(&addr("x"), OpenMode::Listen),
            Err(TransportError::Unavailable)
        );
    }

    #[test]
    fn close_notifies_both_ends() {
        let network = MemoryNetwork::new();
        let mut host = opened(&network, "h", OpenMode::Listen);
        let mut guest = opened(&network, "g", OpenMode::Dial);
        let out = guest.connect(&addr("h")).unwrap();
        guest.poll();
        host.poll();

        guest.close(out);
        assert_eq!(guest.poll(), vec![TransportEvent::ChannelClose { channel: out }]);
        assert!(matches!(
            host.poll().as_slice(),
            [TransportEvent::ChannelClose { .. }]
        ));
        assert_eq!(network.open_channel_ends(), 0);
    }

    #[test]
    fn half_closed_channel_fails_sends() {
        let network = MemoryNetwork::new();
        let _host = opened(&network, "h", OpenMode::Listen);
        let mut guest = opened(&network, "g", OpenMode::Dial);
        let out = guest.connect(&addr("h")).unwrap();

        network.half_close(out);
        assert_eq!(
            guest.send(out, &WireMessage::Unknown),
            Err(TransportError::ChannelClosed(out))
        );
    }

    #[test]
    fn destroy_releases_the_address() {
        let network = MemoryNetwork::new();
        let mut host = opened(&network, "h", OpenMode::Listen);
        host.destroy();
        assert!(!network.is_registered(&addr("h")));
        let _again = opened(&network, "h", OpenMode::Listen);
    }

    #[test]
    fn reconnect_restores_a_dropped_registration() {
        let network = MemoryNetwork::new();
        let mut host = opened(&network, "h", OpenMode::Listen);
        assert!(network.drop_registration(&addr("h")));
        assert_eq!(host.poll(), vec![TransportEvent::Disconnected]);
        assert!(!network.is_registered(&addr("h")));

        host.reconnect().unwrap();
        assert_eq!(host.poll(), vec![TransportEvent::Open]);
        assert!(network.is_registered(&addr("h")));
    }
}
