use bitstream_io::{BigEndian, BitReader, BitWriter};

use super::{DNSHeader, DNSQuestion, DNSRcode, DNSResource, DNSResourceType, PacketComponent};
use crate::error::ParseError;

/// Smallest UDP payload every DNS client must accept
pub const MIN_UDP_PAYLOAD: u16 = 512;
/// Cap on advertised EDNS buffer sizes; larger offers invite fragmentation
pub const MAX_UDP_PAYLOAD: u16 = 4096;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub additionals: Vec<DNSResource>,
}

impl DNSPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        let mut reader = BitReader::endian(buf, BigEndian);
        let mut packet = DNSPacket::default();

        packet.header.read(&mut reader, buf)?;

        for _ in 0..packet.header.qdcount {
            let mut question = DNSQuestion::default();
            question.read(&mut reader, buf)?;
            packet.questions.push(question);
        }
        for _ in 0..packet.header.ancount {
            let mut rr = DNSResource::default();
            rr.read(&mut reader, buf)?;
            packet.answers.push(rr);
        }
        for _ in 0..packet.header.nscount {
            let mut rr = DNSResource::default();
            rr.read(&mut reader, buf)?;
            packet.authorities.push(rr);
        }
        for _ in 0..packet.header.arcount {
            let mut rr = DNSResource::default();
            rr.read(&mut reader, buf)?;
            packet.additionals.push(rr);
        }

        Ok(packet)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut packet = self.clone();
        packet.update_counts();

        let mut bytes = Vec::with_capacity(512);
        let mut writer = BitWriter::endian(&mut bytes, BigEndian);

        packet.header.write(&mut writer)?;
        for question in &packet.questions {
            question.write(&mut writer)?;
        }
        for rr in &packet.answers {
            rr.write(&mut writer)?;
        }
        for rr in &packet.authorities {
            rr.write(&mut writer)?;
        }
        for rr in &packet.additionals {
            rr.write(&mut writer)?;
        }

        Ok(bytes)
    }

    pub fn update_counts(&mut self) {
        self.header.qdcount = self.questions.len() as u16;
        self.header.ancount = self.answers.len() as u16;
        self.header.nscount = self.authorities.len() as u16;
        self.header.arcount = self.additionals.len() as u16;
    }

    /// Skeleton of an authoritative answer to this query
    pub fn create_response(&self) -> Self {
        DNSPacket {
            header: DNSHeader {
                id: self.header.id,
                qr: true,
                opcode: self.header.opcode,
                aa: true,
                tc: false,
                rd: self.header.rd,
                ra: false,
                z: 0,
                rcode: DNSRcode::NoError.as_u8(),
                qdcount: self.header.qdcount,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// UDP payload size the client advertised via EDNS, clamped to
    /// [MIN_UDP_PAYLOAD, MAX_UDP_PAYLOAD]; 512 without an OPT record
    pub fn max_udp_payload_size(&self) -> u16 {
        for rr in &self.additionals {
            if rr.rtype == DNSResourceType::OPT {
                // For OPT the class field carries the payload size
                let advertised: u16 = rr.rclass.into();
                return advertised.clamp(MIN_UDP_PAYLOAD, MAX_UDP_PAYLOAD);
            }
        }
        MIN_UDP_PAYLOAD
    }

    /// Copy with the answer section dropped and TC set, for oversized UDP
    pub fn truncated(&self) -> Self {
        let mut packet = self.clone();
        packet.answers.clear();
        packet.authorities.clear();
        packet.additionals.clear();
        packet.header.tc = true;
        packet.update_counts();
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DNSResourceClass;

    // dig-style query for records under the tunnel zone
    const SAMPLE_QUERY: &[u8] = &[
        0x12, 0x34, // id
        0x01, 0x00, // flags: standard query, rd
        0x00, 0x01, // qdcount
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // an/ns/ar
        0x05, b'h', b'e', b'l', b'l', b'o', //
        0x05, b'b', b'e', b'g', b'i', b'n', //
        0x06, b't', b'u', b'n', b'n', b'e', b'l', //
        0x07, b'e', b'x', b'a', b'm', b'p', b'l', b'e', //
        0x03, b'c', b'o', b'm', //
        0x00, //
        0x00, 0x10, // qtype TXT
        0x00, 0x01, // qclass IN
    ];

    #[test]
    fn parses_query() {
        let packet = DNSPacket::parse(SAMPLE_QUERY).expect("parse");
        assert_eq!(packet.header.id, 0x1234);
        assert!(!packet.header.qr);
        assert!(packet.header.rd);
        assert_eq!(packet.questions.len(), 1);
        let q = &packet.questions[0];
        assert_eq!(q.name(), "hello.begin.tunnel.example.com");
        assert_eq!(q.qtype, DNSResourceType::TXT);
        assert_eq!(q.qclass, DNSResourceClass::IN);
    }

    #[test]
    fn response_round_trips() {
        let query = DNSPacket::parse(SAMPLE_QUERY).expect("parse");
        let mut response = query.create_response();
        response.answers.push(DNSResource::txt(
            query.questions[0].labels.clone(),
            60,
            "success=True",
        ));

        let bytes = response.serialize().expect("serialize");
        let parsed = DNSPacket::parse(&bytes).expect("reparse");

        assert!(parsed.header.qr);
        assert!(parsed.header.aa);
        assert_eq!(parsed.header.id, 0x1234);
        assert_eq!(parsed.answers.len(), 1);
        assert_eq!(parsed.answers[0].rtype, DNSResourceType::TXT);
        assert_eq!(
            parsed.answers[0].txt_segments().unwrap(),
            vec!["success=True"]
        );
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(DNSPacket::parse(&SAMPLE_QUERY[..10]).is_err());
        assert!(DNSPacket::parse(&[]).is_err());
    }

    #[test]
    fn edns_payload_size_is_clamped() {
        let mut query = DNSPacket::parse(SAMPLE_QUERY).expect("parse");
        assert_eq!(query.max_udp_payload_size(), 512);

        query.additionals.push(DNSResource {
            labels: Vec::new(),
            rtype: DNSResourceType::OPT,
            rclass: DNSResourceClass::from(1232u16),
            ttl: 0,
            rdata: Vec::new(),
        });
        assert_eq!(query.max_udp_payload_size(), 1232);

        query.additionals[0].rclass = DNSResourceClass::from(65000u16);
        assert_eq!(query.max_udp_payload_size(), MAX_UDP_PAYLOAD);
    }

    #[test]
    fn truncated_copy_drops_answers() {
        let query = DNSPacket::parse(SAMPLE_QUERY).expect("parse");
        let mut response = query.create_response();
        response
            .answers
            .push(DNSResource::txt(vec!["a".into()], 60, "k=v"));
        let truncated = response.truncated();
        assert!(truncated.header.tc);
        assert!(truncated.answers.is_empty());
        assert_eq!(truncated.questions, response.questions);
    }
}
