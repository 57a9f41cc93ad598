use std::net::SocketAddr;
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::net::UdpSocket;

/// The send half of the datagram transport, as seen by the reliability engine. Sending is
///  best effort: a failure is reported, but the caller does not retry beyond what the channel's
///  own retransmission does anyway.
///
/// It is passed around as an `Arc<dyn ...>` so the engine does not depend on a concrete socket.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatagramSender: Send + Sync {
    async fn send_datagram(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()>;
}

#[async_trait]
impl DatagramSender for UdpSocket {
    async fn send_datagram(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        //TODO "don't fragment" flag
        UdpSocket::send_to(self, buf, to).await?;
        Ok(())
    }
}
