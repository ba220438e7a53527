//! Session registry (C1): tracks live client/peer connections and guards
//! the close/publish race with compare-and-remove plus a per-session lock.
//!
//! Grounded on `engine/client.go`'s `Client.Close()` (UnsubscribeAllChannels,
//! then lock, set Closed, close conn, unlock) and `UuidClientMap.Remove`
//! (re-fetch under the same lock, remove only if identity still matches).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::writer::SessionWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Client,
    Peer,
}

/// One live connection: a client session or an S2S peer session.
///
/// `key` is the value used as the membership key in the channel registry
/// (the source used the remote socket address; we do the same so that two
/// sessions sharing a uuid never collide in a channel's member set before
/// the old one is fully closed).
pub struct Session {
    pub uuid: String,
    pub kind: SessionKind,
    key: String,
    authed: AtomicBool,
    closed: AtomicBool,
    subscriptions: Mutex<HashSet<String>>,
    writer: SessionWriter,
    /// Serializes Close against Session Registry Remove (§4.1, §5).
    close_lock: Mutex<()>,
}

impl Session {
    pub fn new(uuid: impl Into<String>, kind: SessionKind, key: impl Into<String>, writer: SessionWriter) -> Arc<Self> {
        Arc::new(Self {
            uuid: uuid.into(),
            kind,
            key: key.into(),
            authed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            subscriptions: Mutex::new(HashSet::new()),
            writer,
            close_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn is_authed(&self) -> bool {
        self.authed.load(Ordering::Acquire)
    }

    pub fn set_authed(&self) {
        self.authed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn writer(&self) -> &SessionWriter {
        &self.writer
    }

    /// Marks the session terminally closed. Idempotent. Serialized against
    /// `SessionRegistry::remove` via `close_lock` so a publish (or the
    /// registry) observing this flag set can never race a half-finished
    /// removal.
    pub fn mark_closed(&self) {
        let _guard = self.close_lock.lock();
        self.closed.store(true, Ordering::Release);
    }

    pub fn has_subscription(&self, channel: &str) -> bool {
        self.subscriptions.lock().contains(channel)
    }

    pub fn insert_subscription(&self, channel: &str) -> bool {
        self.subscriptions.lock().insert(channel.to_string())
    }

    pub fn remove_subscription(&self, channel: &str) -> bool {
        self.subscriptions.lock().remove(channel)
    }

    /// Snapshot of subscribed channels, used by `UnsubscribeAll` (4.3.3).
    pub fn subscriptions_snapshot(&self) -> Vec<String> {
        self.subscriptions.lock().iter().cloned().collect()
    }

    pub fn clear_subscriptions(&self) {
        self.subscriptions.lock().clear();
    }
}

/// `uuid -> Session` concurrent registry (C1).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    /// Insert, returning the previous session at this uuid (if any) so the
    /// caller can close it — the source closes a superseded session rather
    /// than letting it linger.
    pub fn register(&self, uuid: impl Into<String>, session: Arc<Session>) -> Option<Arc<Session>> {
        self.sessions.insert(uuid.into(), session)
    }

    #[must_use]
    pub fn get(&self, uuid: &str) -> Option<Arc<Session>> {
        self.sessions.get(uuid).map(|e| e.value().clone())
    }

    /// Compare-and-remove: only removes the mapping if it still points at
    /// `session`. A stale `Close` of a superseded session can never evict
    /// the session that replaced it (scenario 6, §8).
    pub fn remove(&self, uuid: &str, session: &Arc<Session>) -> bool {
        let _guard = session.close_lock.lock();
        let should_remove = matches!(self.sessions.get(uuid), Some(entry) if Arc::ptr_eq(entry.value(), session));
        if should_remove {
            self.sessions.remove(uuid);
        }
        should_remove
    }

    /// Snapshot of currently registered uuids, used by shutdown to close
    /// every live session without holding the registry locked while doing
    /// so (§5).
    #[must_use]
    pub fn all_uuids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::SessionWriter;

    fn writer() -> SessionWriter {
        SessionWriter::new(8).0
    }

    #[test]
    fn compare_and_remove_protects_superseding_session() {
        let registry = SessionRegistry::new();
        let s1 = Session::new("u", SessionKind::Client, "addr1", writer());
        let s2 = Session::new("u", SessionKind::Client, "addr2", writer());

        registry.register("u", s1.clone());
        registry.register("u", s2.clone());

        // s1's delayed Close must not evict s2.
        assert!(!registry.remove("u", &s1));
        assert_eq!(registry.get("u").map(|s| s.key().to_string()), Some("addr2".to_string()));

        assert!(registry.remove("u", &s2));
        assert!(registry.get("u").is_none());
    }

    #[test]
    fn subscription_snapshot_round_trips() {
        let s = Session::new("u", SessionKind::Client, "addr", writer());
        assert!(s.insert_subscription("room1"));
        assert!(!s.insert_subscription("room1"));
        assert!(s.has_subscription("room1"));
        assert_eq!(s.subscriptions_snapshot(), vec!["room1".to_string()]);
        assert!(s.remove_subscription("room1"));
        assert!(s.subscriptions_snapshot().is_empty());
    }
}
