//! Reliable delivery on top of UDP datagrams.
//!
//! Every remote address gets a session ([remote_peer::RemotePeer]) with four channels offering
//!  different delivery guarantees, from fire-and-forget to reliable and ordered (see [channel]).
//!  On top of the channels, a session runs a small connection state machine: handshake,
//!  keepalive pings and disconnect.
//!
//! A [session_table::SessionTable] holds all sessions of a local endpoint. It is fed incoming
//!  datagrams, sends through a [transport::DatagramSender], and reports to the application through
//!  [events::PeerEvents]. Processing is poll driven: the owner calls
//!  [session_table::SessionTable::tick] periodically.

pub mod config;
pub mod packet;
pub mod channel;
pub mod transport;
pub mod events;
pub mod remote_peer;
pub mod session_table;
pub mod test_util;
