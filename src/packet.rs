//! Wire format of a single datagram.
//!
//! ```ascii
//! 0: packet type (u8)
//! 1: channel (u8)
//! 2: sequence number (u16 LE) - per remote and channel, wrap-around. Meaningful only for
//!     channels that track order or reliability, 0 for channel `None`
//! 4: payload - the rest of the datagram, copied verbatim
//! ```
//!
//! There is no magic number, length prefix or checksum: the datagram boundary is the framing.

use std::fmt::{Display, Formatter};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum PacketType {
    Connect = 1,
    Disconnect = 2,
    Ping = 3,
    Pong = 4,
    /// deliverable to the application without an established connection
    UnconnectedMessage = 5,
    UserData = 6,
    /// acknowledges the packet with the same sequence number on the same (reliable) channel.
    ///  Consumed by the channel, never seen by the session.
    Ack = 7,
}
impl PacketType {
    /// system packets drive the connection state machine rather than carrying application data
    pub fn is_system(&self) -> bool {
        matches!(self, PacketType::Connect | PacketType::Disconnect | PacketType::Ping | PacketType::Pong)
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum Channel {
    None = 0,
    InOrder = 1,
    Reliable = 2,
    ReliableInOrder = 3,
}
impl Channel {
    pub const ALL: [Channel; 4] = [Channel::None, Channel::InOrder, Channel::Reliable, Channel::ReliableInOrder];

    pub fn index(&self) -> usize {
        u8::from(*self) as usize
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MalformedPacket {
    TooShort { len: usize },
    UnknownPacketType(u8),
    UnknownChannel(u8),
}
impl Display for MalformedPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedPacket::TooShort { len } => write!(f, "datagram of {} bytes is shorter than the {} byte header", len, Packet::HEADER_LEN),
            MalformedPacket::UnknownPacketType(t) => write!(f, "unknown packet type {}", t),
            MalformedPacket::UnknownChannel(c) => write!(f, "unknown channel {}", c),
        }
    }
}
impl std::error::Error for MalformedPacket {}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub channel: Channel,
    pub sequence: u16,
    pub payload: Bytes,
}
impl Packet {
    pub const HEADER_LEN: usize = 4;

    pub fn new(packet_type: PacketType, channel: Channel, sequence: u16, payload: Bytes) -> Packet {
        Packet {
            packet_type,
            channel,
            sequence,
            payload,
        }
    }

    pub fn ack(channel: Channel, sequence: u16) -> Packet {
        Packet::new(PacketType::Ack, channel, sequence, Bytes::new())
    }

    pub fn serialized_len(&self) -> usize {
        Self::HEADER_LEN + self.payload.len()
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.packet_type.into());
        buf.put_u8(self.channel.into());
        buf.put_u16_le(self.sequence);
        buf.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.ser(&mut buf);
        buf.freeze()
    }

    pub fn deser(mut buf: &[u8]) -> Result<Packet, MalformedPacket> {
        if buf.len() < Self::HEADER_LEN {
            return Err(MalformedPacket::TooShort { len: buf.len() });
        }

        let raw_type = buf.get_u8();
        let packet_type = PacketType::try_from(raw_type)
            .map_err(|_| MalformedPacket::UnknownPacketType(raw_type))?;
        let raw_channel = buf.get_u8();
        let channel = Channel::try_from(raw_channel)
            .map_err(|_| MalformedPacket::UnknownChannel(raw_channel))?;
        let sequence = buf.get_u16_le();

        Ok(Packet {
            packet_type,
            channel,
            sequence,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::user_data(Packet::new(PacketType::UserData, Channel::ReliableInOrder, 5, Bytes::from_static(b"Pong")), b"\x06\x03\x05\0Pong")]
    #[case::connect(Packet::new(PacketType::Connect, Channel::Reliable, 0x1234, Bytes::from_static(b"h2ik")), b"\x01\x02\x34\x12h2ik")]
    #[case::empty_payload(Packet::new(PacketType::Ping, Channel::None, 0, Bytes::new()), b"\x03\0\0\0")]
    #[case::ack(Packet::ack(Channel::InOrder, 0xffff), b"\x07\x01\xff\xff")]
    fn test_ser(#[case] packet: Packet, #[case] expected: &[u8]) {
        let mut buf = BytesMut::new();
        packet.ser(&mut buf);
        assert_eq!(&buf[..], expected);
        assert_eq!(packet.serialized_len(), expected.len());
    }

    #[rstest]
    fn test_round_trip_is_byte_identical() {
        let original = Packet::new(PacketType::UserData, Channel::ReliableInOrder, 5, Bytes::from_static(b"Pong"));
        let encoded = original.to_bytes();

        let decoded = Packet::deser(&encoded).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.to_bytes(), encoded);
    }

    #[rstest]
    #[case::empty(b"", MalformedPacket::TooShort { len: 0 })]
    #[case::partial_header(b"\x06\x03\x05", MalformedPacket::TooShort { len: 3 })]
    #[case::type_zero(b"\0\0\0\0", MalformedPacket::UnknownPacketType(0))]
    #[case::type_too_big(b"\x08\0\0\0abc", MalformedPacket::UnknownPacketType(8))]
    #[case::unknown_channel(b"\x06\x04\0\0", MalformedPacket::UnknownChannel(4))]
    fn test_deser_malformed(#[case] buf: &[u8], #[case] expected: MalformedPacket) {
        assert_eq!(Packet::deser(buf), Err(expected));
    }

    #[rstest]
    fn test_deser_header_only() {
        let packet = Packet::deser(b"\x02\x02\x01\x01").unwrap();
        assert_eq!(packet, Packet::new(PacketType::Disconnect, Channel::Reliable, 0x0101, Bytes::new()));
    }

    #[rstest]
    #[case(PacketType::Connect, true)]
    #[case(PacketType::Disconnect, true)]
    #[case(PacketType::Ping, true)]
    #[case(PacketType::Pong, true)]
    #[case(PacketType::UnconnectedMessage, false)]
    #[case(PacketType::UserData, false)]
    #[case(PacketType::Ack, false)]
    fn test_is_system(#[case] packet_type: PacketType, #[case] expected: bool) {
        assert_eq!(packet_type.is_system(), expected);
    }

    #[rstest]
    fn test_channel_index_matches_all() {
        for (i, channel) in Channel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
        }
    }
}
