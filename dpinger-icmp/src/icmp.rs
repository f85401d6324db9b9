use pnet::packet::{Packet, icmp, ipv4};

pub const ICMP_HEADER_SIZE: usize = 8;
/// size of the embedded send-timestamp payload (little-endian nanoseconds)
pub const PAYLOAD_SIZE: usize = 8;
pub type Payload = [u8; PAYLOAD_SIZE];

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid size")]
    InvalidSize,
    #[error("invalid packet")]
    InvalidPacket,
    #[error("ipv4 packet failed")]
    BadIpv4,
}

#[derive(Debug, Clone)]
pub struct EchoRequest<'a> {
    pub ident: u16,
    pub seq_cnt: u16,
    pub payload: &'a [u8],
}

impl EchoRequest<'_> {
    pub fn encode(&self, buffer: &mut [u8]) -> Result<(), Error> {
        let mut packet =
            icmp::echo_request::MutableEchoRequestPacket::new(buffer).ok_or(Error::InvalidSize)?;
        packet.set_icmp_type(icmp::IcmpTypes::EchoRequest);
        packet.set_identifier(self.ident);
        packet.set_sequence_number(self.seq_cnt);
        packet.set_payload(self.payload);

        let checksum =
            icmp::checksum(&icmp::IcmpPacket::new(packet.packet()).ok_or(Error::InvalidSize)?);
        packet.set_checksum(checksum);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EchoReply {
    pub ident: u16,
    pub seq_cnt: u16,
    pub payload: Payload,
}

impl EchoReply {
    pub fn decode(buffer: &[u8], decode_header: bool) -> Result<Self, Error> {
        // needed for borrowck
        let ipv4_packet;
        let buffer = if decode_header {
            ipv4_packet = ipv4::Ipv4Packet::new(buffer).ok_or(Error::BadIpv4)?;
            ipv4_packet.payload()
        } else {
            buffer
        };
        let packet = icmp::echo_reply::EchoReplyPacket::new(buffer).ok_or(Error::InvalidPacket)?;
        if packet.get_icmp_type() != icmp::IcmpTypes::EchoReply {
            return Err(Error::InvalidPacket);
        }
        if buffer[ICMP_HEADER_SIZE..].len() != PAYLOAD_SIZE {
            return Err(Error::InvalidSize);
        }
        let mut payload = [0; PAYLOAD_SIZE];
        payload.copy_from_slice(&buffer[ICMP_HEADER_SIZE..]);

        Ok(Self {
            ident: packet.get_identifier(),
            seq_cnt: packet.get_sequence_number(),
            payload,
        })
    }

    /// the nanosecond send timestamp recovered from the payload
    pub fn sent_at_ns(&self) -> u64 {
        u64::from_le_bytes(self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_reply(ident: u16, seq_cnt: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; ICMP_HEADER_SIZE + payload.len()];
        let mut packet =
            icmp::echo_reply::MutableEchoReplyPacket::new(&mut buf).expect("buffer large enough");
        packet.set_icmp_type(icmp::IcmpTypes::EchoReply);
        packet.set_identifier(ident);
        packet.set_sequence_number(seq_cnt);
        packet.set_payload(payload);
        let checksum =
            icmp::checksum(&icmp::IcmpPacket::new(packet.packet()).expect("valid packet"));
        packet.set_checksum(checksum);
        buf
    }

    #[test]
    fn round_trips_timestamp_payload() {
        let sent_ns: u64 = 123_456_789_012_345;
        let payload = sent_ns.to_le_bytes();
        let buf = encode_reply(1000, 1000, &payload);

        let reply = EchoReply::decode(&buf, false).unwrap();
        assert_eq!(reply.seq_cnt, 1000);
        assert_eq!(reply.sent_at_ns(), sent_ns);
    }

    #[test]
    fn rejects_wrong_size_payload() {
        let buf = encode_reply(1, 1, &[0u8; PAYLOAD_SIZE + 4]);
        assert!(matches!(
            EchoReply::decode(&buf, false),
            Err(Error::InvalidSize)
        ));
    }

    #[test]
    fn rejects_non_reply_type() {
        let payload = 0u64.to_le_bytes();
        let mut buf = vec![0u8; ICMP_HEADER_SIZE + PAYLOAD_SIZE];
        let req = EchoRequest {
            ident: 1,
            seq_cnt: 1,
            payload: &payload,
        };
        req.encode(&mut buf).unwrap();
        assert!(matches!(
            EchoReply::decode(&buf, false),
            Err(Error::InvalidPacket)
        ));
    }
}
