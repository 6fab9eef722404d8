//! Session store (design §4.7): named sessions with FIFO-ordered TTL
//! culling, keyed by an opaque id handed to the client as a cookie.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::request::ContextValue;

/// One session's data plus bookkeeping timestamps, both in "seconds since
/// some monotonic epoch" per the caller's clock source (design keeps the
/// store clock-agnostic; the reactor supplies `now`).
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    pub data: HashMap<String, ContextValue>,
    pub created: Duration,
    pub last_touch: Duration,
}

/// Process-wide store of live sessions plus the FIFO eviction queue.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, SessionRecord>,
    fifo: VecDeque<String>,
    lifetime: Duration,
    cull_per_start: usize,
}

/// Outcome of [`SessionStore::start`]: whether a `Set-Cookie` must be
/// emitted for a freshly minted id.
pub struct StartOutcome {
    pub id: String,
    pub is_new: bool,
}

impl SessionStore {
    pub fn new(lifetime: Duration, cull_per_start: usize) -> Self {
        SessionStore {
            sessions: HashMap::new(),
            fifo: VecDeque::new(),
            lifetime,
            cull_per_start,
        }
    }

    /// `sessionStart(options)`: resolves `cookie_id` (the id carried by the
    /// request's cookie, if any) to an existing session, or mints a new one
    /// and enqueues it. Runs the bounded eviction sweep first.
    pub fn start(
        &mut self,
        now: Duration,
        cookie_id: Option<&str>,
        id_seed: &IdSeed,
    ) -> StartOutcome {
        self.cull(now);

        if let Some(id) = cookie_id {
            if let Some(record) = self.sessions.get_mut(id) {
                record.last_touch = now;
                return StartOutcome {
                    id: id.to_string(),
                    is_new: false,
                };
            }
        }

        let id = id_seed.generate();
        self.sessions.insert(
            id.clone(),
            SessionRecord {
                data: HashMap::new(),
                created: now,
                last_touch: now,
            },
        );
        self.fifo.push_front(id.clone());
        StartOutcome { id, is_new: true }
    }

    pub fn get(&self, id: &str) -> Option<&SessionRecord> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut SessionRecord> {
        self.sessions.get_mut(id)
    }

    /// Walks up to `cull_per_start` entries from the tail of the FIFO,
    /// dropping any whose `last_touch + lifetime` has passed (design §4.7
    /// "Eviction").
    fn cull(&mut self, now: Duration) {
        for _ in 0..self.cull_per_start {
            let Some(id) = self.fifo.back().cloned() else {
                break;
            };
            let expired = match self.sessions.get(&id) {
                Some(record) => now.saturating_sub(record.last_touch) > self.lifetime,
                None => true,
            };
            if !expired {
                break;
            }
            self.fifo.pop_back();
            self.sessions.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Supplies the ingredients for collision-resistant id generation: cookie
/// name, a monotonically advancing counter standing in for current time,
/// server identifier, and remote address (design §4.7).
pub struct IdSeed {
    pub cookie_name: String,
    pub server_identifier: String,
    pub remote_address: String,
    counter: std::cell::Cell<u64>,
}

impl IdSeed {
    pub fn new(cookie_name: impl Into<String>, server_identifier: impl Into<String>, remote_address: impl Into<String>) -> Self {
        IdSeed {
            cookie_name: cookie_name.into(),
            server_identifier: server_identifier.into(),
            remote_address: remote_address.into(),
            counter: std::cell::Cell::new(0),
        }
    }

    fn generate(&self) -> String {
        let n = self.counter.get();
        self.counter.set(n + 1);
        let mut hasher = fnv::FnvHasher::default();
        use std::hash::Hasher;
        hasher.write(self.cookie_name.as_bytes());
        hasher.write(self.server_identifier.as_bytes());
        hasher.write(self.remote_address.as_bytes());
        hasher.write_u64(n);
        hex::encode(hasher.finish().to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> IdSeed {
        IdSeed::new("SID", "srv-1", "127.0.0.1:9999")
    }

    #[test]
    fn start_without_cookie_mints_new_session() {
        let mut store = SessionStore::new(Duration::from_secs(60), 5);
        let out = store.start(Duration::from_secs(0), None, &seed());
        assert!(out.is_new);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn start_with_known_cookie_reuses_session() {
        let mut store = SessionStore::new(Duration::from_secs(60), 5);
        let first = store.start(Duration::from_secs(0), None, &seed());
        let second = store.start(Duration::from_secs(1), Some(&first.id), &seed());
        assert!(!second.is_new);
        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn id_appears_at_most_once_in_fifo() {
        let mut store = SessionStore::new(Duration::from_secs(60), 5);
        let first = store.start(Duration::from_secs(0), None, &seed());
        store.start(Duration::from_secs(1), Some(&first.id), &seed());
        assert_eq!(store.fifo.iter().filter(|id| **id == first.id).count(), 1);
    }

    #[test]
    fn expired_session_culled_on_next_start() {
        let mut store = SessionStore::new(Duration::from_secs(10), 5);
        let first = store.start(Duration::from_secs(0), None, &seed());
        // Past lifetime; a later, unrelated start should sweep it away.
        store.start(Duration::from_secs(100), None, &seed());
        assert!(store.get(&first.id).is_none());
    }
}
