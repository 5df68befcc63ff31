use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{DNSResourceClass, DNSResourceType, PacketComponent};
use crate::error::ParseError;

/// Longest chunk placed in one TXT character-string. The wire limit is 255;
/// clients of the transmission API expect splits at 250.
pub const TXT_SEGMENT_LEN: usize = 250;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSResource {
    pub labels: Vec<String>,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl DNSResource {
    pub fn name(&self) -> String {
        self.labels.join(".")
    }

    /// Build a TXT record, splitting `text` into character-strings of at most
    /// `TXT_SEGMENT_LEN` bytes inside a single record
    pub fn txt(labels: Vec<String>, ttl: u32, text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut rdata = Vec::with_capacity(bytes.len() + bytes.len() / TXT_SEGMENT_LEN + 1);
        if bytes.is_empty() {
            rdata.push(0);
        } else {
            for chunk in bytes.chunks(TXT_SEGMENT_LEN) {
                rdata.push(chunk.len() as u8);
                rdata.extend_from_slice(chunk);
            }
        }
        Self {
            labels,
            rtype: DNSResourceType::TXT,
            rclass: DNSResourceClass::IN,
            ttl,
            rdata,
        }
    }

    /// Character-strings of a TXT record, in order
    pub fn txt_segments(&self) -> Result<Vec<String>, ParseError> {
        let mut segments = Vec::new();
        let mut pos = 0usize;
        while pos < self.rdata.len() {
            let len = self.rdata[pos] as usize;
            let start = pos + 1;
            let end = start + len;
            let bytes = self
                .rdata
                .get(start..end)
                .ok_or(ParseError::InvalidResourceRecord)?;
            segments
                .push(String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidLabel)?);
            pos = end;
        }
        Ok(segments)
    }
}

impl PacketComponent for DNSResource {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.rclass.into())?;
        writer.write_var::<u32>(32, self.ttl)?;
        if self.rdata.len() > u16::MAX as usize {
            return Err(ParseError::InvalidResourceRecord);
        }
        writer.write_var::<u16>(16, self.rdata.len() as u16)?;
        writer.write_bytes(&self.rdata)?;
        Ok(())
    }

    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        self.labels = self.read_labels(reader, packet_buf)?;
        self.rtype = reader.read_var::<u16>(16)?.into();
        self.rclass = reader.read_var::<u16>(16)?.into();
        self.ttl = reader.read_var::<u32>(32)?;
        let rdlength = reader.read_var::<u16>(16)? as usize;
        let mut rdata = vec![0u8; rdlength];
        reader.read_bytes(&mut rdata)?;
        self.rdata = rdata;
        Ok(())
    }
}
