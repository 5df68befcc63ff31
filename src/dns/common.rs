use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use crate::error::ParseError;

const MAX_LABEL_LEN: u8 = 63;
const MAX_POINTER_JUMPS: usize = 16;

/// Shared read/write plumbing for everything that lives inside a DNS packet.
/// Readers get the full packet buffer so compression pointers can be followed.
pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<(), ParseError>;

    fn read_labels<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<Vec<String>, ParseError> {
        let mut labels = Vec::new();

        loop {
            let first_byte = reader.read_var::<u8>(8)?;

            if first_byte == 0 {
                break;
            }

            if (first_byte & 0xC0) == 0xC0 {
                let second_byte = reader.read_var::<u8>(8)?;
                let pointer = (((first_byte & 0x3F) as u16) << 8) | second_byte as u16;
                let (mut pointed, _) = parse_name_at(packet_buf, pointer as usize)?;
                labels.append(&mut pointed);
                break;
            }

            if first_byte > MAX_LABEL_LEN {
                return Err(ParseError::InvalidLabel);
            }

            let mut label_buf = vec![0u8; first_byte as usize];
            reader.read_bytes(&mut label_buf)?;
            let label = String::from_utf8(label_buf).map_err(|_| ParseError::InvalidLabel)?;
            labels.push(label);
        }

        Ok(labels)
    }

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        for label in labels {
            if label.is_empty() || label.len() > MAX_LABEL_LEN as usize {
                return Err(ParseError::InvalidLabel);
            }
            writer.write_var::<u8>(8, label.len() as u8)?;
            writer.write_bytes(label.as_bytes())?;
        }
        writer.write_var::<u8>(8, 0)?;
        Ok(())
    }
}

/// Parse a domain name starting at `offset` in the raw packet, following
/// compression pointers. Returns the labels and the number of bytes the name
/// occupies at `offset` itself (pointer targets are not counted).
pub fn parse_name_at(buf: &[u8], offset: usize) -> Result<(Vec<String>, usize), ParseError> {
    let mut labels = Vec::new();
    let mut pos = offset;
    let mut jumps = 0usize;
    let mut consumed = None;

    loop {
        let first_byte = *buf.get(pos).ok_or(ParseError::UnexpectedEof)?;

        if first_byte == 0 {
            let end = pos + 1;
            return Ok((labels, consumed.unwrap_or(end - offset)));
        }

        if (first_byte & 0xC0) == 0xC0 {
            let second_byte = *buf.get(pos + 1).ok_or(ParseError::UnexpectedEof)?;
            let target = ((((first_byte & 0x3F) as u16) << 8) | second_byte as u16) as usize;
            if consumed.is_none() {
                consumed = Some(pos + 2 - offset);
            }
            // Pointers must go backwards; anything else is a loop in the making
            if target >= pos {
                return Err(ParseError::InvalidLabel);
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(ParseError::InvalidLabel);
            }
            pos = target;
            continue;
        }

        if first_byte > MAX_LABEL_LEN {
            return Err(ParseError::InvalidLabel);
        }

        let start = pos + 1;
        let end = start + first_byte as usize;
        let bytes = buf.get(start..end).ok_or(ParseError::UnexpectedEof)?;
        let label = String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidLabel)?;
        labels.push(label);
        pos = end;
    }
}
