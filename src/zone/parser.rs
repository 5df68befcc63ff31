use crate::dns::{DNSResource, DNSResourceClass, DNSResourceType};
use crate::error::{BifrostError, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::debug;

const DEFAULT_TTL: u32 = 3600;

/// Line-oriented zone file parser covering the record types fixed zones use:
/// A, AAAA, NS, CNAME, MX, TXT and single-line SOA. `$ORIGIN` and `$TTL`
/// directives, `@`, relative names and `;` comments are honored.
pub struct ZoneParser {
    origin: String,
    default_ttl: u32,
    last_name: Option<String>,
}

impl ZoneParser {
    pub fn new() -> Self {
        Self {
            origin: String::new(),
            default_ttl: DEFAULT_TTL,
            last_name: None,
        }
    }

    pub fn parse(mut self, contents: &str) -> Result<Vec<DNSResource>> {
        let mut records = Vec::new();

        for (lineno, raw_line) in contents.lines().enumerate() {
            let line = strip_comment(raw_line).trim_end();
            if line.trim().is_empty() {
                continue;
            }

            if let Some(rest) = line.trim().strip_prefix("$ORIGIN") {
                self.origin = rest.trim().trim_end_matches('.').to_string();
                continue;
            }
            if let Some(rest) = line.trim().strip_prefix("$TTL") {
                self.default_ttl = rest.trim().parse().map_err(|_| {
                    zone_err(lineno, format!("bad $TTL value: {}", rest.trim()))
                })?;
                continue;
            }

            let record = self.parse_record(line, lineno)?;
            debug!("Parsed fixed record: {} {:?}", record.name(), record.rtype);
            records.push(record);
        }

        Ok(records)
    }

    fn parse_record(&mut self, line: &str, lineno: usize) -> Result<DNSResource> {
        // A leading space or tab means "same owner as the previous record"
        let inherits_name = line.starts_with(' ') || line.starts_with('\t');
        let mut fields = tokenize(line);
        if fields.is_empty() {
            return Err(zone_err(lineno, "empty record".into()));
        }

        let name = if inherits_name {
            self.last_name
                .clone()
                .ok_or_else(|| zone_err(lineno, "record inherits owner but none seen yet".into()))?
        } else {
            let owner = fields.remove(0);
            self.qualify(&owner)
        };
        self.last_name = Some(name.clone());

        // Optional TTL and class, in either order
        let mut ttl = self.default_ttl;
        let mut rtype_field = None;
        while let Some(field) = fields.first().cloned() {
            fields.remove(0);
            if let Ok(value) = field.parse::<u32>() {
                ttl = value;
            } else if field.eq_ignore_ascii_case("IN") {
                // class marker, nothing to record
            } else {
                rtype_field = Some(field);
                break;
            }
        }
        let rtype_field =
            rtype_field.ok_or_else(|| zone_err(lineno, "record has no type field".into()))?;

        let rdata = self.parse_rdata(&rtype_field, &fields, lineno)?;
        let (rtype, rdata) = rdata;

        Ok(DNSResource {
            labels: name.split('.').map(str::to_string).collect(),
            rtype,
            rclass: DNSResourceClass::IN,
            ttl,
            rdata,
        })
    }

    fn parse_rdata(
        &self,
        rtype: &str,
        fields: &[String],
        lineno: usize,
    ) -> Result<(DNSResourceType, Vec<u8>)> {
        let need = |n: usize| -> Result<()> {
            if fields.len() < n {
                Err(zone_err(
                    lineno,
                    format!("{} record needs {} rdata fields, got {}", rtype, n, fields.len()),
                ))
            } else {
                Ok(())
            }
        };

        match rtype.to_ascii_uppercase().as_str() {
            "A" => {
                need(1)?;
                let addr: Ipv4Addr = fields[0]
                    .parse()
                    .map_err(|_| zone_err(lineno, format!("bad IPv4 address: {}", fields[0])))?;
                Ok((DNSResourceType::A, addr.octets().to_vec()))
            }
            "AAAA" => {
                need(1)?;
                let addr: Ipv6Addr = fields[0]
                    .parse()
                    .map_err(|_| zone_err(lineno, format!("bad IPv6 address: {}", fields[0])))?;
                Ok((DNSResourceType::AAAA, addr.octets().to_vec()))
            }
            "NS" => {
                need(1)?;
                Ok((DNSResourceType::NS, encode_name(&self.qualify(&fields[0]))))
            }
            "CNAME" => {
                need(1)?;
                Ok((
                    DNSResourceType::CNAME,
                    encode_name(&self.qualify(&fields[0])),
                ))
            }
            "MX" => {
                need(2)?;
                let preference: u16 = fields[0]
                    .parse()
                    .map_err(|_| zone_err(lineno, format!("bad MX preference: {}", fields[0])))?;
                let mut rdata = preference.to_be_bytes().to_vec();
                rdata.extend(encode_name(&self.qualify(&fields[1])));
                Ok((DNSResourceType::MX, rdata))
            }
            "TXT" => {
                need(1)?;
                let mut rdata = Vec::new();
                for field in fields {
                    for chunk in field.as_bytes().chunks(255) {
                        rdata.push(chunk.len() as u8);
                        rdata.extend_from_slice(chunk);
                    }
                }
                Ok((DNSResourceType::TXT, rdata))
            }
            "SOA" => {
                need(7)?;
                let mut rdata = encode_name(&self.qualify(&fields[0]));
                rdata.extend(encode_name(&self.qualify(&fields[1])));
                for field in &fields[2..7] {
                    let value: u32 = field
                        .parse()
                        .map_err(|_| zone_err(lineno, format!("bad SOA counter: {}", field)))?;
                    rdata.extend(value.to_be_bytes());
                }
                Ok((DNSResourceType::SOA, rdata))
            }
            other => Err(zone_err(
                lineno,
                format!("unsupported record type: {}", other),
            )),
        }
    }

    fn qualify(&self, name: &str) -> String {
        if name == "@" {
            self.origin.clone()
        } else if let Some(fqdn) = name.strip_suffix('.') {
            fqdn.to_string()
        } else if self.origin.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", name, self.origin)
        }
    }
}

impl Default for ZoneParser {
    fn default() -> Self {
        Self::new()
    }
}

fn zone_err(lineno: usize, msg: String) -> BifrostError {
    BifrostError::ZoneParseError(format!("line {}: {}", lineno + 1, msg))
}

fn strip_comment(line: &str) -> &str {
    // A ';' inside a quoted TXT string is content, not a comment
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

fn tokenize(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    fields.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        fields.push(current);
    }
    fields
}

fn encode_name(name: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(name.len() + 2);
    for label in name.split('.').filter(|l| !l.is_empty()) {
        bytes.push(label.len().min(63) as u8);
        bytes.extend_from_slice(&label.as_bytes()[..label.len().min(63)]);
    }
    bytes.push(0);
    bytes
}
