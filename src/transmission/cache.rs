use super::ApiResponse;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// Short-TTL memoization of `query name -> rendered response`. Recursors
/// retransmit; replaying the cached response keeps `begin` from minting a new
/// transmission id per retry.
pub struct ResponseCache {
    entries: DashMap<String, CachedResponse>,
    ttl: Duration,
    capacity: usize,
}

#[derive(Clone, Debug)]
struct CachedResponse {
    response: ApiResponse,
    expires: Instant,
    inserted: Instant,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, name: &str) -> Option<ApiResponse> {
        let entry = self.entries.get(name)?;
        if entry.expires <= Instant::now() {
            drop(entry);
            self.entries.remove(name);
            return None;
        }
        trace!("Response cache hit for {}", name);
        Some(entry.response.clone())
    }

    pub fn insert(&self, name: String, response: ApiResponse) {
        if self.entries.len() >= self.capacity {
            self.sweep();
        }
        let now = Instant::now();
        self.entries.insert(
            name,
            CachedResponse {
                response,
                expires: now + self.ttl,
                inserted: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries; if that freed nothing, drop the oldest insert
    fn sweep(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires > now);
        if self.entries.len() < before {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted)
            .map(|entry| entry.key().clone());
        if let Some(name) = oldest {
            self.entries.remove(&name);
        }
    }
}
