use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// One client tunnel: captured response packets waiting for the client's next
/// `r` poll, plus the spoofed ports its outstanding forwards hold.
pub struct Session {
    id: String,
    pending: Mutex<VecDeque<String>>,
    owned_ports: Mutex<HashSet<u16>>,
    max_pending: usize,
}

impl Session {
    pub fn new(id: String, max_pending: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            pending: Mutex::new(VecDeque::new()),
            owned_ports: Mutex::new(HashSet::new()),
            max_pending: max_pending.max(1),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue one base64-encoded response packet. Past the high-water mark the
    /// oldest entry is dropped; the client is polling, so fresh captures win.
    pub fn push_pending(&self, packet: String) {
        let mut pending = self.pending.lock();
        if pending.len() >= self.max_pending {
            warn!(
                "Session {} response queue full, dropping oldest packet",
                self.id
            );
            pending.pop_front();
        }
        pending.push_back(packet);
        debug!(
            "Session {} now has {} packets waiting",
            self.id,
            pending.len()
        );
    }

    /// Drain FIFO until the byte budget is spent. Mirrors the wire budget: the
    /// check runs before each pop, so one packet may overshoot but the queue
    /// never wedges on an oversized entry.
    pub fn drain_pending(&self, byte_budget: usize) -> Vec<String> {
        let mut pending = self.pending.lock();
        let mut drained = Vec::new();
        let mut spent = 0usize;
        while spent < byte_budget {
            let Some(packet) = pending.pop_front() else {
                break;
            };
            spent += packet.len() + 1;
            drained.push(packet);
        }
        drained
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn track_port(&self, port: u16) {
        self.owned_ports.lock().insert(port);
    }

    pub fn untrack_port(&self, port: u16) {
        self.owned_ports.lock().remove(&port);
    }

    pub fn owned_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.owned_ports.lock().iter().copied().collect();
        ports.sort_unstable();
        ports
    }
}

/// Live sessions by id
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id().to_string(), session);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_respects_byte_budget() {
        let session = Session::new("abcd1234".into(), 64);
        for i in 0..5 {
            session.push_pending(format!("packet{:03}", i)); // 9 bytes each
        }
        // 9+1 per packet; the pre-pop check lets a third through before tripping
        let drained = session.drain_pending(25);
        assert_eq!(drained, vec!["packet000", "packet001", "packet002"]);
        assert_eq!(session.pending_len(), 2);
    }

    #[test]
    fn drain_is_fifo_across_calls() {
        let session = Session::new("abcd1234".into(), 64);
        session.push_pending("one".into());
        session.push_pending("two".into());
        assert_eq!(session.drain_pending(1), vec!["one"]);
        assert_eq!(session.drain_pending(1000), vec!["two"]);
        assert!(session.drain_pending(1000).is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let session = Session::new("abcd1234".into(), 2);
        session.push_pending("one".into());
        session.push_pending("two".into());
        session.push_pending("three".into());
        assert_eq!(session.drain_pending(1000), vec!["two", "three"]);
    }

    #[test]
    fn store_insert_get_remove() {
        let store = SessionStore::new();
        let session = Session::new("cafe0001".into(), 8);
        store.insert(Arc::clone(&session));
        assert!(store.get("cafe0001").is_some());
        assert!(store.get("cafe0002").is_none());
        let removed = store.remove("cafe0001").expect("removed");
        assert_eq!(removed.id(), "cafe0001");
        assert!(store.is_empty());
    }
}
