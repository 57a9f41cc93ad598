use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::bail;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::TransportConfig;
use crate::events::PeerEvents;
use crate::packet::{Channel, Packet, PacketType};
use crate::remote_peer::RemotePeer;
use crate::transport::DatagramSender;

/// All sessions of a local endpoint, keyed by remote address.
///
/// Incoming datagrams are fed in through [SessionTable::deliver_datagram] (or
///  [SessionTable::recv_loop] for a UDP socket), and [SessionTable::tick] must be called
///  periodically to deliver received packets, send acknowledgements and retransmissions, and
///  detect dead peers.
///
/// The map lock is never held while a session is processed, and each session has its own lock,
///  so the receive path and the tick can run in different tasks.
pub struct SessionTable {
    config: Arc<TransportConfig>,
    events: Arc<dyn PeerEvents>,
    sender: Arc<dyn DatagramSender>,
    sessions: RwLock<FxHashMap<SocketAddr, Arc<Mutex<RemotePeer>>>>,
}
impl SessionTable {
    pub fn new(config: Arc<TransportConfig>, events: Arc<dyn PeerEvents>, sender: Arc<dyn DatagramSender>) -> anyhow::Result<SessionTable> {
        config.validate()?;
        Ok(SessionTable {
            config,
            events,
            sender,
            sessions: Default::default(),
        })
    }

    pub async fn recv_loop(&self, socket: &UdpSocket) {
        let mut buf = vec![0u8; self.config.max_datagram_size];
        loop {
            let (num_read, from) = match socket.recv_from(&mut buf).await {
                Ok(x) => x,
                Err(e) => {
                    error!("socket error: {}", e);
                    continue;
                }
            };
            self.deliver_datagram(from, &buf[..num_read]).await;
        }
    }

    pub async fn deliver_datagram(&self, from: SocketAddr, buf: &[u8]) {
        let packet = match Packet::deser(buf) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("received malformed datagram from {:?}: {} - dropping", from, e);
                return;
            }
        };

        let existing = self.sessions.read().await
            .get(&from)
            .cloned();

        let session = match existing {
            Some(session) => session,
            None => match packet.packet_type {
                PacketType::Connect => self.get_or_create_session(from).await,
                PacketType::UnconnectedMessage => {
                    self.events.on_data_received(from, &packet.payload);
                    return;
                }
                other => {
                    debug!("received {:?} packet from unknown remote {:?} - dropping", other, from);
                    return;
                }
            }
        };

        session.lock().await
            .queue_incoming_packet(packet);
    }

    async fn get_or_create_session(&self, addr: SocketAddr) -> Arc<Mutex<RemotePeer>> {
        match self.sessions
            .write().await
            .entry(addr)
        {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                debug!("new session for {:?}", addr);
                e.insert(Arc::new(Mutex::new(RemotePeer::new(self.config.clone(), addr)))).clone()
            }
        }
    }

    /// Starts an outbound handshake. The `Connect` packet goes out with the next tick, and is
    ///  retransmitted until the peer acknowledges it.
    ///
    /// Returns `false` if there is an established connection or a pending handshake with the
    ///  address already, or if the session with it is still closing.
    pub async fn connect(&self, to: SocketAddr, payload: Bytes) -> bool {
        let session = self.get_or_create_session(to).await;
        let mut session = session.lock().await;
        session.connect(payload)
    }

    /// Sends a `Disconnect` to the peer. The session is no longer connected right away, but it
    ///  stays in the table until the peer acknowledges the `Disconnect` (which is retransmitted
    ///  until then) or the session times out.
    pub async fn disconnect(&self, addr: SocketAddr) -> bool {
        let session = match self.sessions.read().await.get(&addr) {
            Some(session) => session.clone(),
            None => return false,
        };

        let mut session = session.lock().await;
        if !session.disconnect() {
            debug!("already disconnecting from {:?}", addr);
            return false;
        }
        session.flush(self.sender.as_ref()).await;
        true
    }

    pub async fn disconnect_all(&self) {
        let addrs = self.sessions.read().await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        for addr in addrs {
            self.disconnect(addr).await;
        }
    }

    fn check_payload_size(&self, payload: &Bytes) -> bool {
        if payload.len() + Packet::HEADER_LEN > self.config.max_datagram_size {
            warn!("payload of {} bytes exceeds the maximum datagram size of {} - not sending", payload.len(), self.config.max_datagram_size);
            return false;
        }
        true
    }

    /// Queues a payload for a connected peer. Returns `false` if there is no connection to the
    ///  address or the payload does not fit into a datagram.
    pub async fn send_to(&self, to: SocketAddr, channel: Channel, payload: Bytes) -> bool {
        if !self.check_payload_size(&payload) {
            return false;
        }

        let session = match self.sessions.read().await.get(&to) {
            Some(session) => session.clone(),
            None => {
                debug!("no session for {:?} - not sending", to);
                return false;
            }
        };

        let mut session = session.lock().await;
        if !session.is_connected() {
            debug!("not connected to {:?} - not sending", to);
            return false;
        }
        session.queue_outgoing(PacketType::UserData, channel, payload);
        true
    }

    /// Queues a payload for every connected peer. Returns `false` if the payload does not fit
    ///  into a datagram.
    pub async fn send_to_all(&self, channel: Channel, payload: Bytes) -> bool {
        if !self.check_payload_size(&payload) {
            return false;
        }

        for session in self.snapshot().await {
            let mut session = session.lock().await;
            if session.is_connected() {
                session.queue_outgoing(PacketType::UserData, channel, payload.clone());
            }
        }
        true
    }

    /// Sends a single `UnconnectedMessage` datagram right away, without requiring (or creating)
    ///  a session
    pub async fn send_unconnected(&self, to: SocketAddr, payload: Bytes) -> anyhow::Result<()> {
        if payload.len() + Packet::HEADER_LEN > self.config.max_datagram_size {
            bail!("payload of {} bytes exceeds the maximum datagram size of {}", payload.len(), self.config.max_datagram_size);
        }
        let packet = Packet::new(PacketType::UnconnectedMessage, Channel::None, 0, payload);
        self.sender.send_datagram(to, &packet.to_bytes()).await
    }

    /// One processing pass over all sessions: deliver what was received, send what is due, and
    ///  drop sessions that were closed, rejected or timed out, or whose local disconnect was
    ///  acknowledged.
    pub async fn tick(&self) {
        let now = Instant::now();

        let mut to_remove = Vec::new();
        for session in self.snapshot().await {
            let mut peer = session.lock().await;

            if peer.is_timed_out(now) {
                info!("session with {:?} timed out", peer.remote_addr());
                if peer.is_connected() {
                    self.events.on_disconnected(peer.remote_addr());
                }
                to_remove.push((peer.remote_addr(), session.clone()));
                continue;
            }

            let status = peer.send_and_receive(self.events.as_ref(), self.sender.as_ref()).await;
            if !status.is_open() {
                debug!("session with {:?} ended: {:?}", peer.remote_addr(), status);
                to_remove.push((peer.remote_addr(), session.clone()));
            }
            else if peer.is_disconnect_acknowledged() {
                debug!("disconnect from {:?} acknowledged", peer.remote_addr());
                to_remove.push((peer.remote_addr(), session.clone()));
            }
        }

        if to_remove.is_empty() {
            return;
        }

        let mut sessions = self.sessions.write().await;
        for (addr, session) in to_remove {
            // the session may have been replaced while the map was not locked
            if let Entry::Occupied(e) = sessions.entry(addr) {
                if Arc::ptr_eq(e.get(), &session) {
                    e.remove();
                }
            }
        }
    }

    async fn snapshot(&self) -> Vec<Arc<Mutex<RemotePeer>>> {
        self.sessions.read().await
            .values()
            .cloned()
            .collect()
    }

    pub async fn connected_remotes(&self) -> Vec<SocketAddr> {
        let mut result = Vec::new();
        for session in self.snapshot().await {
            let session = session.lock().await;
            if session.is_connected() {
                result.push(session.remote_addr());
            }
        }
        result
    }

    pub async fn is_connected(&self, addr: SocketAddr) -> bool {
        let session = self.sessions.read().await
            .get(&addr)
            .cloned();
        match session {
            Some(session) => session.lock().await.is_connected(),
            None => false,
        }
    }

    pub async fn contains(&self, addr: SocketAddr) -> bool {
        self.sessions.read().await
            .contains_key(&addr)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
