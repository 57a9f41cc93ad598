use std::net::SocketAddr;
use std::sync::Arc;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, error, trace};

use crate::channel::{ChannelSet, DeliveryChannel};
use crate::config::TransportConfig;
use crate::events::PeerEvents;
use crate::packet::{Channel, MalformedPacket, Packet, PacketType};
use crate::transport::DatagramSender;

/// Payload of the `Connect` packet with which the accepting side confirms a handshake
pub const CONNECT_ACK_PAYLOAD: &[u8] = b"h2ik";

/// Result of a single [RemotePeer::send_and_receive] pass, telling the owner whether to keep the
///  session
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionStatus {
    Open,
    /// the peer sent a `Disconnect`
    Closed,
    /// the application refused the peer's connection request
    Rejected,
}
impl SessionStatus {
    pub fn is_open(&self) -> bool {
        *self == SessionStatus::Open
    }
}

/// All state for communication with a single remote address: one instance of each delivery
///  channel, and the connection state machine on top of them.
///
/// A remote peer is driven by repeated calls to [RemotePeer::send_and_receive]. It is not
///  synchronized internally, the owner ensures there is at most one pass in progress at any time.
pub struct RemotePeer {
    config: Arc<TransportConfig>,
    remote_addr: SocketAddr,
    is_connected: bool,
    awaiting_connect_ack: bool,
    /// a local disconnect was requested, and the session stays until the peer acknowledges it
    is_closing: bool,
    channels: ChannelSet,
    last_received: Instant,
    last_ping_sent: Instant,
}
impl RemotePeer {
    pub fn new(config: Arc<TransportConfig>, remote_addr: SocketAddr) -> RemotePeer {
        let now = Instant::now();
        RemotePeer {
            channels: ChannelSet::new(&config),
            config,
            remote_addr,
            is_connected: false,
            awaiting_connect_ack: false,
            is_closing: false,
            last_received: now,
            last_ping_sent: now,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn is_closing(&self) -> bool {
        self.is_closing
    }

    /// true once the peer acknowledged everything sent on the Reliable channel since a local
    ///  disconnect, the `Disconnect` packet included
    pub fn is_disconnect_acknowledged(&self) -> bool {
        self.is_closing && self.channels.get(Channel::Reliable).num_in_flight() == 0
    }

    pub fn queue_outgoing(&mut self, packet_type: PacketType, channel: Channel, payload: Bytes) {
        self.channels.get_mut(channel).queue_outgoing(packet_type, payload);
    }

    /// Decodes a raw datagram and routes it to the channel named in its header. Nothing is
    ///  delivered to the application before the next call to [RemotePeer::send_and_receive].
    pub fn queue_incoming(&mut self, datagram: &[u8]) -> Result<(), MalformedPacket> {
        let packet = Packet::deser(datagram)?;
        self.queue_incoming_packet(packet);
        Ok(())
    }

    pub fn queue_incoming_packet(&mut self, packet: Packet) {
        trace!("received {:?} packet #{} on channel {:?} from {}", packet.packet_type, packet.sequence, packet.channel, self.remote_addr);
        self.last_received = Instant::now();
        self.channels.get_mut(packet.channel).queue_incoming(packet);
    }

    /// Starts an outbound handshake, attaching an application defined payload. Returns `false`
    ///  without sending anything if the session is connected, has a handshake in progress, or is
    ///  closing.
    pub fn connect(&mut self, payload: Bytes) -> bool {
        if self.is_connected || self.awaiting_connect_ack || self.is_closing {
            debug!("not initiating handshake with {}: connected={}, handshake pending={}, closing={}", self.remote_addr, self.is_connected, self.awaiting_connect_ack, self.is_closing);
            return false;
        }
        debug!("initiating handshake with {}", self.remote_addr);
        self.awaiting_connect_ack = true;
        self.queue_outgoing(PacketType::Connect, Channel::Reliable, payload);
        true
    }

    /// Queues a `Disconnect` on the Reliable channel. It is re-sent like any other reliable
    ///  packet until the peer acknowledges it, see [RemotePeer::is_disconnect_acknowledged].
    ///  Returns `false` if a disconnect is already in progress.
    pub fn disconnect(&mut self) -> bool {
        if self.is_closing {
            return false;
        }
        debug!("disconnecting from {}", self.remote_addr);
        self.is_connected = false;
        self.awaiting_connect_ack = false;
        self.is_closing = true;
        self.queue_outgoing(PacketType::Disconnect, Channel::Reliable, Bytes::new());
        true
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        now.duration_since(self.last_received) >= self.config.idle_timeout
    }

    /// One processing pass: handle everything the channels released for delivery, then send
    ///  everything that is due.
    pub async fn send_and_receive(&mut self, events: &dyn PeerEvents, sender: &dyn DatagramSender) -> SessionStatus {
        let (system_packets, data_packets): (Vec<Packet>, Vec<Packet>) = self.channels.drain_incoming()
            .into_iter()
            .partition(|p| p.packet_type.is_system());

        for packet in system_packets.into_iter().chain(data_packets) {
            if let Some(status) = self.on_packet(packet, events) {
                if status == SessionStatus::Closed {
                    // acknowledge the Disconnect so the peer can stop re-sending it
                    self.flush(sender).await;
                }
                return status;
            }
        }

        let now = Instant::now();
        if self.is_connected && now.duration_since(self.last_ping_sent) >= self.config.ping_interval {
            self.last_ping_sent = now;
            self.queue_outgoing(PacketType::Ping, Channel::None, Bytes::new());
        }

        self.flush(sender).await;
        SessionStatus::Open
    }

    /// sends all outgoing packets that are due, without processing incoming packets
    pub async fn flush(&mut self, sender: &dyn DatagramSender) {
        for packet in self.channels.drain_outgoing(Instant::now()) {
            trace!("sending {:?} packet #{} on channel {:?} to {}", packet.packet_type, packet.sequence, packet.channel, self.remote_addr);
            if let Err(e) = sender.send_datagram(self.remote_addr, &packet.to_bytes()).await {
                error!("error sending {:?} packet to {}: {}", packet.packet_type, self.remote_addr, e);
            }
        }
    }

    fn on_packet(&mut self, packet: Packet, events: &dyn PeerEvents) -> Option<SessionStatus> {
        match packet.packet_type {
            PacketType::Connect => return self.on_connect(&packet.payload, events),
            PacketType::Disconnect => {
                debug!("received disconnect from {}", self.remote_addr);
                self.is_connected = false;
                self.awaiting_connect_ack = false;
                events.on_disconnected(self.remote_addr);
                return Some(SessionStatus::Closed);
            }
            PacketType::Ping => {
                if self.is_closing {
                    trace!("ping from {} while closing - not answering", self.remote_addr);
                }
                else {
                    self.queue_outgoing(PacketType::Pong, Channel::Reliable, Bytes::new());
                }
            }
            PacketType::Pong => trace!("pong from {}", self.remote_addr),
            PacketType::UnconnectedMessage => self.deliver(&packet.payload, events),
            PacketType::UserData => {
                if self.is_connected {
                    self.deliver(&packet.payload, events);
                }
                else {
                    debug!("received data from unconnected peer {} - dropping", self.remote_addr);
                }
            }
            // consumed by the channels
            PacketType::Ack => {}
        }
        None
    }

    fn on_connect(&mut self, payload: &[u8], events: &dyn PeerEvents) -> Option<SessionStatus> {
        if self.is_connected {
            debug!("duplicate connect from {} - ignoring", self.remote_addr);
            return None;
        }
        if self.is_closing {
            debug!("connect from {} while closing - ignoring", self.remote_addr);
            return None;
        }

        if self.awaiting_connect_ack && payload == CONNECT_ACK_PAYLOAD {
            debug!("handshake with {} confirmed", self.remote_addr);
            self.on_connected();
            return None;
        }

        if events.on_connection_requested(self.remote_addr, payload) {
            debug!("accepted connection from {}", self.remote_addr);
            self.on_connected();
            self.queue_outgoing(PacketType::Connect, Channel::Reliable, Bytes::from_static(CONNECT_ACK_PAYLOAD));
            None
        }
        else {
            debug!("rejected connection from {}", self.remote_addr);
            Some(SessionStatus::Rejected)
        }
    }

    fn on_connected(&mut self) {
        self.is_connected = true;
        self.awaiting_connect_ack = false;
        self.last_ping_sent = Instant::now();
    }

    fn deliver(&self, payload: &[u8], events: &dyn PeerEvents) {
        if !events.on_data_received(self.remote_addr, payload) {
            trace!("application did not consume payload from {}", self.remote_addr);
        }
    }
}
