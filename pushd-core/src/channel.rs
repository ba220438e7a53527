//! Channel registry (C2): `channel -> members` with a bounded LRU-ish
//! residency policy.
//!
//! Grounded on `engine/pubsub.go`'s `PubsubChans` (a `cache.LruCache`
//! wrapping a `cmap.ConcurrentMap` of members per channel). No crate in
//! this workspace's dependency graph (or the wider example pack near this
//! domain) supplies an LRU structure that is also safe to mutate
//! concurrently from many publish/subscribe call sites, so residency is
//! hand-rolled here: a `DashMap` of entries, each carrying an
//! `AtomicU64` "last touched" tick from a single logical clock. Eviction
//! is an O(n) sweep over channel names, which is acceptable since it only
//! runs when the registry is over its configured bound.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::session::Session;

/// Members of one channel, keyed by `Session::key()`.
pub struct ChannelEntry {
    members: DashMap<String, Arc<Session>>,
    last_touch: AtomicU64,
}

impl ChannelEntry {
    fn new(tick: u64) -> Self {
        Self {
            members: DashMap::new(),
            last_touch: AtomicU64::new(tick),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.members.insert(session.key().to_string(), session);
    }

    pub fn remove(&self, key: &str) -> Option<Arc<Session>> {
        self.members.remove(key).map(|(_, s)| s)
    }

    /// Snapshot of current members for fan-out (Publish/Forward/Publish2).
    /// Cloning `Arc<Session>` handles, not the sessions themselves.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.members.iter().map(|e| e.value().clone()).collect()
    }
}

pub struct ChannelRegistry {
    channels: DashMap<String, Arc<ChannelEntry>>,
    clock: AtomicU64,
    max_items: usize,
    evicted: AtomicU64,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new(max_items: usize) -> Self {
        Self {
            channels: DashMap::new(),
            clock: AtomicU64::new(0),
            max_items,
            evicted: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Atomic get-or-create (4.2). Exactly one concurrent caller observes
    /// `created = true` for a given channel because `DashMap::entry` locks
    /// the owning shard for the duration of `or_insert_with`.
    pub fn get_or_create(&self, channel: &str) -> (Arc<ChannelEntry>, bool) {
        let tick = self.tick();
        let mut created = false;
        let entry = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(ChannelEntry::new(tick))
            });
        let handle = entry.value().clone();
        drop(entry);
        handle.last_touch.store(tick, Ordering::Relaxed);
        if created {
            self.evict_if_over_bound();
        }
        (handle, created)
    }

    #[must_use]
    pub fn get(&self, channel: &str) -> Option<Arc<ChannelEntry>> {
        let found = self.channels.get(channel).map(|e| e.value().clone());
        if let Some(entry) = &found {
            entry.last_touch.store(self.tick(), Ordering::Relaxed);
        }
        found
    }

    /// Removes the channel entry only if it is still empty at the moment
    /// of removal (atomic 1->0 tie-break: exactly one racing unsubscribe
    /// observes `true` and is responsible for the S2S unsubscribe-interest
    /// notification).
    pub fn remove_if_empty(&self, channel: &str) -> bool {
        self.channels
            .remove_if(channel, |_, entry| entry.is_empty())
            .is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Approximate LRU sweep: if the registry exceeds its bound, evict the
    /// channel with the oldest `last_touch`. Per §4.2, an evicted channel
    /// that still had members is treated as "all subscribers implicitly
    /// unsubscribed from that channel on this node" — the per-session
    /// subscription caches are deliberately left untouched, so a later
    /// explicit Unsubscribe from one of those sessions is still a safe
    /// (if redundant) no-op against the channel registry.
    fn evict_if_over_bound(&self) {
        if self.channels.len() <= self.max_items {
            return;
        }
        let oldest = self
            .channels
            .iter()
            .min_by_key(|e| e.value().last_touch.load(Ordering::Relaxed))
            .map(|e| e.key().clone());
        if let Some(name) = oldest {
            if self.channels.remove(&name).is_some() {
                self.evicted.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(channel = %name, "evicted live channel entry under LRU residency bound");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKind;
    use crate::writer::SessionWriter;

    fn session(uuid: &str, key: &str) -> Arc<Session> {
        Session::new(uuid, SessionKind::Client, key, SessionWriter::new(8).0)
    }

    #[test]
    fn get_or_create_tie_break_is_exactly_once() {
        let reg = ChannelRegistry::new(100);
        let (_, created1) = reg.get_or_create("room1");
        let (_, created2) = reg.get_or_create("room1");
        assert!(created1);
        assert!(!created2);
    }

    #[test]
    fn remove_if_empty_is_atomic_on_nonempty() {
        let reg = ChannelRegistry::new(100);
        let (entry, _) = reg.get_or_create("room1");
        entry.insert(session("a", "addr-a"));
        assert!(!reg.remove_if_empty("room1"));
        entry.remove("addr-a");
        assert!(reg.remove_if_empty("room1"));
        assert!(reg.get("room1").is_none());
    }

    #[test]
    fn bound_evicts_least_recently_touched() {
        let reg = ChannelRegistry::new(2);
        reg.get_or_create("a");
        reg.get_or_create("b");
        reg.get_or_create("c");
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.evicted_count(), 1);
        assert!(reg.get("a").is_none());
    }
}
