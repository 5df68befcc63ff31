mod forwarder;
mod ports;
mod raw;
mod store;

pub use forwarder::{ForwardOutcome, Forwarder};
pub use ports::{PortLease, PortPool};
pub use raw::{RawConduit, RawNetwork, RawSocketNetwork, TransportKind};
pub use store::{Session, SessionStore};

use crate::util::short_id;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use tracing::{debug, info, warn};

/// Base64 for packets on the DNS leg. Unpadded on the way out ('=' cannot
/// travel in a reply), indifferent to padding on the way in.
pub const PACKET_ENCODING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Session-layer verb dispatch. Messages are hyphen-delimited ASCII records;
/// the first field picks the verb, every reply is a hyphen-delimited record
/// built from the domain-safe alphabet.
pub struct SessionHandler {
    sessions: SessionStore,
    forwarder: Forwarder,
    max_pending_packets: usize,
    max_response_bytes: usize,
}

impl SessionHandler {
    pub fn new(
        forwarder: Forwarder,
        max_pending_packets: usize,
        max_response_bytes: usize,
    ) -> Self {
        Self {
            sessions: SessionStore::new(),
            forwarder,
            max_pending_packets,
            max_response_bytes,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn handle_message(&self, message: &str) -> String {
        let mut components = message.split('-');
        let verb = components.next().unwrap_or_default();
        match verb {
            "b" => self.begin_session(),
            "f" => self.forward_packets(components),
            "r" => self.request_packets(components),
            "e" => self.end_session(components),
            "test" => {
                let reply: String = message.chars().rev().collect();
                debug!("Session layer received test message, responding with {}", reply);
                reply
            }
            other => {
                warn!("Unknown session message verb: {:?}", other);
                format!("f-1-Message_type_{}_is_unknown", sanitize_field(other))
            }
        }
    }

    fn begin_session(&self) -> String {
        let id = loop {
            let candidate = short_id();
            if self.sessions.get(&candidate).is_none() {
                break candidate;
            }
        };
        let session = Session::new(id.clone(), self.max_pending_packets);
        self.sessions.insert(session);
        info!("Began session {}", id);
        format!("s-{}", id)
    }

    fn forward_packets<'a>(&self, mut components: impl Iterator<Item = &'a str>) -> String {
        let sid = components.next().unwrap_or_default();
        let Some(session) = self.sessions.get(sid) else {
            return unknown_session(sid);
        };

        // The reply reflects the last packet's outcome; earlier failures in a
        // batch are only logged
        let mut outcome = ForwardOutcome::Sent;
        let mut count = 0usize;
        for encoded in components {
            count += 1;
            outcome = match PACKET_ENCODING.decode(encoded) {
                Ok(raw) => self.forwarder.forward(&session, raw),
                Err(_) => ForwardOutcome::InvalidPacket,
            };
        }
        debug!("Forwarded {} packets for session {}", count, sid);

        match outcome {
            ForwardOutcome::Sent => "s".to_string(),
            ForwardOutcome::InvalidPacket => {
                warn!("Failed to forward invalid packet for session {}", sid);
                "f-0-Packet_is_Invalid".to_string()
            }
            ForwardOutcome::NoFreePorts => {
                warn!("No free port to forward packet for session {}", sid);
                "f-0-Could_not_find_a_free_port".to_string()
            }
        }
    }

    fn request_packets<'a>(&self, mut components: impl Iterator<Item = &'a str>) -> String {
        let sid = components.next().unwrap_or_default();
        let Some(session) = self.sessions.get(sid) else {
            return unknown_session(sid);
        };
        let packets = session.drain_pending(self.max_response_bytes);
        debug!(
            "Session {} requested packets, replying with {}",
            sid,
            packets.len()
        );
        let mut reply = String::from("s");
        for packet in packets {
            reply.push('-');
            reply.push_str(&packet);
        }
        reply
    }

    fn end_session<'a>(&self, mut components: impl Iterator<Item = &'a str>) -> String {
        let sid = components.next().unwrap_or_default();
        match self.sessions.remove(sid) {
            Some(_) => {
                info!("Ended session {}", sid);
                "s".to_string()
            }
            None => unknown_session(sid),
        }
    }
}

fn unknown_session(sid: &str) -> String {
    format!("f-2-Session_identifier_{}_is_unknown", sanitize_field(sid))
}

/// Client-supplied text interpolated into a reply keeps only characters that
/// cannot corrupt the record
fn sanitize_field(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/'))
        .collect()
}
