use crate::config::ServerConfig;
use crate::dns::{DNSPacket, DNSRcode};
use crate::session::SessionHandler;
use crate::transmission::{
    ApiHandler, ResponseCache, TransmissionStore, parse_api_request, render_txt_answers,
};
use crate::zone::FixedZone;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

/// Top-level request dispatch: NXDOMAIN outside the zone, fixed records when
/// they match, everything else is transmission API traffic.
pub struct Resolver {
    zone_labels: Vec<String>,
    fixed: FixedZone,
    api: ApiHandler,
    cache: ResponseCache,
    /// Serializes cache lookup, API side effects and cache fill so duplicate
    /// in-flight queries cannot mint two transmission ids. Never held across
    /// I/O.
    api_lock: Mutex<()>,
}

impl Resolver {
    pub fn new(config: &ServerConfig, fixed: FixedZone, sessions: Arc<SessionHandler>) -> Self {
        let store = TransmissionStore::new(config.max_active_transmissions);
        Self {
            zone_labels: config.zone_labels(),
            fixed,
            api: ApiHandler::new(store, sessions),
            cache: ResponseCache::new(config.cache_ttl(), config.cache_capacity),
            api_lock: Mutex::new(()),
        }
    }

    pub fn resolve(&self, query: &DNSPacket) -> DNSPacket {
        let mut reply = query.create_response();

        if query.header.qr || query.header.opcode != 0 {
            reply.header.rcode = DNSRcode::NotImp.as_u8();
            return reply;
        }
        let Some(question) = query.questions.first() else {
            reply.header.rcode = DNSRcode::FormErr.as_u8();
            return reply;
        };
        if query.questions.len() > 1 {
            debug!("Query carries {} questions, answering the first", query.questions.len());
        }

        let name = question.name();
        trace!("Request for {}", name);

        if !self.name_in_zone(&question.labels) {
            reply.header.rcode = DNSRcode::NXDomain.as_u8();
            return reply;
        }

        if let Some(records) = self.fixed.lookup(&name) {
            debug!("Found fixed records for {}", name);
            reply.answers.extend_from_slice(records);
            reply.update_counts();
            return reply;
        }

        let response = {
            let _guard = self.api_lock.lock();
            // Recursors re-ask and 0x20-randomize; key case-insensitively
            let cache_key = name.to_lowercase();
            match self.cache.get(&cache_key) {
                Some(cached) => cached,
                None => {
                    let subdomain = &question.labels[..question.labels.len() - self.zone_labels.len()];
                    let request = parse_api_request(subdomain, &name);
                    let response = self.api.handle(request);
                    self.cache.insert(cache_key, response.clone());
                    response
                }
            }
        };

        reply.answers = render_txt_answers(&question.labels, &response);
        reply.update_counts();
        reply
    }

    fn name_in_zone(&self, labels: &[String]) -> bool {
        if labels.len() < self.zone_labels.len() {
            return false;
        }
        labels[labels.len() - self.zone_labels.len()..]
            .iter()
            .zip(&self.zone_labels)
            .all(|(label, zone_label)| label.eq_ignore_ascii_case(zone_label))
    }
}
