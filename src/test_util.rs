//! Utilities for testing code built on the reliability engine: an in-memory [DatagramSender]
//!  that records what was sent, and a [PeerEvents] implementation that records notifications.
//!  They are part of the regular (non-#[cfg(test)]) code so applications can use them in their
//!  tests as well.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Mutex;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::events::PeerEvents;
use crate::packet::Packet;
use crate::transport::DatagramSender;

/// convenience function for unit test code: create a [SocketAddr] based on a number, the same
///  number generating the same address and different numbers different addresses
pub fn test_addr_from_number(number: u16) -> SocketAddr {
    SocketAddrV4::new(Ipv4Addr::LOCALHOST, number).into()
}

#[derive(Debug, Default)]
pub struct TrackingDatagramSender {
    tracker: RwLock<Vec<(SocketAddr, Bytes)>>,
}
impl TrackingDatagramSender {
    pub fn new() -> Self {
        Default::default()
    }

    /// returns sent datagrams, clearing the internal buffer
    pub async fn sent_datagrams(&self) -> Vec<(SocketAddr, Bytes)> {
        let mut lock = self.tracker.write().await;
        std::mem::take(&mut *lock)
    }

    /// returns sent datagrams decoded as packets, clearing the internal buffer
    pub async fn sent_packets(&self) -> Vec<(SocketAddr, Packet)> {
        self.sent_datagrams().await
            .into_iter()
            .map(|(to, buf)| (to, Packet::deser(&buf).expect("only well-formed packets are sent")))
            .collect()
    }
}

#[async_trait]
impl DatagramSender for TrackingDatagramSender {
    async fn send_datagram(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        self.tracker.write().await.push((to, Bytes::copy_from_slice(buf)));
        Ok(())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RecordedEvent {
    ConnectionRequested(SocketAddr, Vec<u8>),
    DataReceived(SocketAddr, Vec<u8>),
    Disconnected(SocketAddr),
}

/// Records all notifications, accepting connection requests depending on a flag
#[derive(Debug)]
pub struct RecordingPeerEvents {
    accept_connections: bool,
    events: Mutex<Vec<RecordedEvent>>,
}
impl RecordingPeerEvents {
    pub fn new(accept_connections: bool) -> Self {
        RecordingPeerEvents {
            accept_connections,
            events: Default::default(),
        }
    }

    /// returns recorded events, clearing the internal buffer
    pub fn events(&self) -> Vec<RecordedEvent> {
        let mut lock = self.events.lock()
            .expect("lock is never poisoned");
        std::mem::take(&mut *lock)
    }

    fn record(&self, event: RecordedEvent) {
        self.events.lock()
            .expect("lock is never poisoned")
            .push(event);
    }
}

impl PeerEvents for RecordingPeerEvents {
    fn on_connection_requested(&self, remote_addr: SocketAddr, payload: &[u8]) -> bool {
        self.record(RecordedEvent::ConnectionRequested(remote_addr, payload.to_vec()));
        self.accept_connections
    }

    fn on_data_received(&self, remote_addr: SocketAddr, payload: &[u8]) -> bool {
        self.record(RecordedEvent::DataReceived(remote_addr, payload.to_vec()));
        true
    }

    fn on_disconnected(&self, remote_addr: SocketAddr) {
        self.record(RecordedEvent::Disconnected(remote_addr));
    }
}

