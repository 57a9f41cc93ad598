use std::net::SocketAddr;
#[cfg(test)] use mockall::automock;

/// Hooks through which the engine notifies the owning host. There is a single handler per
///  session table, and it is called synchronously from within the tick that processes the
///  triggering packet - so implementations should return quickly and offload real work.
#[cfg_attr(test, automock)]
pub trait PeerEvents: Send + Sync {
    /// A peer asks to connect, attaching an application defined payload (protocol version,
    ///  auth token, ...). Returning `false` rejects the connection silently.
    fn on_connection_requested(&self, remote_addr: SocketAddr, payload: &[u8]) -> bool;

    /// Application payload from a connected peer, or an unconnected message from any address.
    ///
    /// The return value is advisory: `false` signals that the application did not consume the
    ///  payload, which is logged but does not affect delivery of later packets.
    fn on_data_received(&self, remote_addr: SocketAddr, payload: &[u8]) -> bool;

    /// The peer sent a disconnect, or it timed out
    fn on_disconnected(&self, remote_addr: SocketAddr);
}
