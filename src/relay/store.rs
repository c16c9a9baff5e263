use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::session::Session;

pub type SharedSession = Arc<Mutex<Session>>;

pub const DEFAULT_MAX_SESSIONS: usize = 1000;
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// How many conversations the store keeps and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub max_sessions: usize,
    /// A session untouched for this long is dropped.
    pub idle_ttl: Duration,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self { max_sessions: DEFAULT_MAX_SESSIONS, idle_ttl: DEFAULT_SESSION_TTL }
    }
}

#[derive(Debug)]
struct Entry {
    session: SharedSession,
    last_used: Instant,
}

/// Sessions keyed by conversation id.
///
/// Each session sits behind its own `tokio::sync::Mutex`, so turns of one
/// conversation are applied one at a time in lock-acquisition order while
/// different conversations proceed in parallel.
///
/// The map is bounded: idle sessions expire after `idle_ttl`, and creating a
/// session when `max_sessions` are live evicts the least recently used one.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Entry>,
    limits: StoreLimits,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: StoreLimits) -> Self {
        Self { sessions: DashMap::new(), limits }
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    pub fn get_or_create(&self, id: &str) -> SharedSession {
        self.get_or_create_at(id, Instant::now())
    }

    fn get_or_create_at(&self, id: &str, now: Instant) -> SharedSession {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            if !self.is_expired(&entry, now) {
                entry.last_used = now;
                return entry.session.clone();
            }
        }
        self.make_room(id, now);

        let mut entry = self.sessions.entry(id.to_string()).or_insert_with(|| {
            debug!(target: "relay", session = id, "session_created");
            Entry { session: Arc::new(Mutex::new(Session::new(id))), last_used: now }
        });
        entry.last_used = now;
        entry.session.clone()
    }

    /// Live session for `id`; does not extend its lifetime.
    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.get_at(id, Instant::now())
    }

    fn get_at(&self, id: &str, now: Instant) -> Option<SharedSession> {
        self.sessions.remove_if(id, |_, e| self.is_expired(e, now));
        self.sessions.get(id).map(|e| e.session.clone())
    }

    /// 削除できた場合 true
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(target: "relay", session = id, "session_removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_used) >= self.limits.idle_ttl
    }

    /// Drop expired sessions (and `id` itself if stale), then evict the
    /// least recently used until there is room for one more.
    fn make_room(&self, id: &str, now: Instant) {
        let before = self.sessions.len();
        self.sessions.retain(|_, e| !self.is_expired(e, now));
        let expired = before.saturating_sub(self.sessions.len());

        let cap = self.limits.max_sessions.max(1);
        let mut evicted = 0usize;
        while self.sessions.len() >= cap && !self.sessions.contains_key(id) {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|e| e.value().last_used)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.sessions.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }

        if expired > 0 || evicted > 0 {
            info!(target: "relay", expired, evicted, live = self.sessions.len(), "sessions_pruned");
        }
    }
}
