use crate::util::short_id;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// One message mid-assembly. Fragments arrive in any order; the first write
/// to an index wins because recursors replay queries.
#[derive(Debug)]
pub struct Transmission {
    fragments: HashMap<usize, String>,
    seq: u64,
}

impl Transmission {
    fn new(seq: u64) -> Self {
        Self {
            fragments: HashMap::new(),
            seq,
        }
    }

    fn add_fragment(&mut self, index: usize, data: String) {
        self.fragments.entry(index).or_insert(data);
    }

    /// Concatenation in index order, if every index in [0, length) is present
    fn assemble(&self, length: usize) -> Option<String> {
        let mut contents = String::new();
        for index in 0..length {
            contents.push_str(self.fragments.get(&index)?);
        }
        Some(contents)
    }
}

pub enum EndOutcome {
    Assembled(String),
    Incomplete,
    UnknownId,
}

/// Registry of live transmissions, bounded so abandoned uploads cannot pin
/// memory forever.
pub struct TransmissionStore {
    live: DashMap<String, Transmission>,
    max_live: usize,
    next_seq: AtomicU64,
}

impl TransmissionStore {
    pub fn new(max_live: usize) -> Self {
        Self {
            live: DashMap::new(),
            max_live,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Allocate a fresh id and insert an empty transmission
    pub fn begin(&self) -> String {
        if self.live.len() >= self.max_live {
            self.evict_oldest();
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        loop {
            let id = short_id();
            // Vanishingly unlikely, but ids must be unique among live entries
            let mut fresh = false;
            self.live.entry(id.clone()).or_insert_with(|| {
                fresh = true;
                Transmission::new(seq)
            });
            if fresh {
                debug!("Began transmission {}", id);
                return id;
            }
        }
    }

    /// Record one fragment; false if the id is unknown. Duplicate indices are
    /// ignored.
    pub fn add(&self, id: &str, index: usize, data: String) -> bool {
        match self.live.get_mut(id) {
            Some(mut transmission) => {
                transmission.add_fragment(index, data);
                true
            }
            None => false,
        }
    }

    /// Close a transmission. It is removed whatever the outcome; the payload
    /// comes back only when every fragment in [0, length) arrived.
    pub fn end(&self, id: &str, length: usize) -> EndOutcome {
        let Some((_, transmission)) = self.live.remove(id) else {
            return EndOutcome::UnknownId;
        };
        match transmission.assemble(length) {
            Some(contents) => EndOutcome::Assembled(contents),
            None => EndOutcome::Incomplete,
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .live
            .iter()
            .min_by_key(|entry| entry.value().seq)
            .map(|entry| entry.key().clone());
        if let Some(id) = oldest {
            warn!("Transmission limit reached, evicting {}", id);
            self.live.remove(&id);
        }
    }
}
