//! Peer router (C4): the set of known peer nodes and the
//! channel -> interested-peers map driven by inbound S2S SUB/UNSUB.
//!
//! Ghost-peer protection is epoch-tagged the same way the teacher's hub
//! guards `PeerDown` against a stale disconnect event from a superseded
//! connection: each `add_peer` call for a given address hands back a
//! fresh epoch, and `remove_peer` only takes effect if the caller's epoch
//! still matches the live one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use crate::writer::SessionWriter;

pub struct PeerHandle {
    pub addr: String,
    epoch: u64,
    writer: SessionWriter,
    suspect: AtomicBool,
}

impl PeerHandle {
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn writer(&self) -> &SessionWriter {
        &self.writer
    }

    #[must_use]
    pub fn is_suspect(&self) -> bool {
        self.suspect.load(Ordering::Acquire)
    }

    pub fn mark_suspect(&self) {
        self.suspect.store(true, Ordering::Release);
    }
}

#[derive(Default)]
pub struct PeerRouter {
    peers: DashMap<String, Arc<PeerHandle>>,
    interest: DashMap<String, DashSet<String>>,
    next_epoch: AtomicU64,
}

impl PeerRouter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            interest: DashMap::new(),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Registers (or replaces) a peer connection, returning the epoch the
    /// caller must present to `remove_peer` for it to take effect.
    pub fn add_peer(&self, addr: impl Into<String>, writer: SessionWriter) -> Arc<PeerHandle> {
        let addr = addr.into();
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(PeerHandle {
            addr: addr.clone(),
            epoch,
            writer,
            suspect: AtomicBool::new(false),
        });
        self.peers.insert(addr, handle.clone());
        handle
    }

    /// Removes the peer only if `epoch` still matches the currently
    /// registered connection for that address (ghost-peer guard).
    pub fn remove_peer(&self, addr: &str, epoch: u64) -> bool {
        self.peers
            .remove_if(addr, |_, handle| handle.epoch == epoch)
            .is_some()
    }

    #[must_use]
    pub fn get_peer(&self, addr: &str) -> Option<Arc<PeerHandle>> {
        self.peers.get(addr).map(|e| e.value().clone())
    }

    #[must_use]
    pub fn all_peers(&self) -> Vec<Arc<PeerHandle>> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }

    pub fn record_peer_subscribe(&self, peer_addr: &str, channel: &str) {
        self.interest
            .entry(channel.to_string())
            .or_insert_with(DashSet::new)
            .insert(peer_addr.to_string());
    }

    /// Removes `peer_addr`'s interest in `channel`; removes the channel's
    /// interest entry entirely once no peer remains interested.
    pub fn record_peer_unsubscribe(&self, peer_addr: &str, channel: &str) {
        if let Some(set) = self.interest.get(channel) {
            set.remove(peer_addr);
            let now_empty = set.is_empty();
            drop(set);
            if now_empty {
                self.interest.remove_if(channel, |_, s| s.is_empty());
            }
        }
    }

    /// `(peers, found)` — `found = false` means no recorded interest, and
    /// the caller (Publish) should broadcast to `all_peers()` instead.
    #[must_use]
    pub fn lookup_peers_by_channel(&self, channel: &str) -> (Vec<String>, bool) {
        match self.interest.get(channel) {
            Some(set) if !set.is_empty() => (set.iter().map(|v| v.clone()).collect(), true),
            _ => (Vec::new(), false),
        }
    }

    /// Drops any recorded interest entries for a peer that has gone away,
    /// called when a peer connection is torn down.
    pub fn drop_peer_interest(&self, peer_addr: &str) {
        self.interest.retain(|_, set| {
            set.remove(peer_addr);
            !set.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> SessionWriter {
        SessionWriter::new(8).0
    }

    #[test]
    fn ghost_peer_removal_is_rejected_after_reconnect() {
        let router = PeerRouter::new();
        let h1 = router.add_peer("peer1", writer());
        let h2 = router.add_peer("peer1", writer());
        assert_ne!(h1.epoch(), h2.epoch());

        assert!(!router.remove_peer("peer1", h1.epoch()));
        assert!(router.get_peer("peer1").is_some());

        assert!(router.remove_peer("peer1", h2.epoch()));
        assert!(router.get_peer("peer1").is_none());
    }

    #[test]
    fn interest_lookup_falls_back_to_not_found() {
        let router = PeerRouter::new();
        router.record_peer_subscribe("peer1", "room1");
        let (peers, found) = router.lookup_peers_by_channel("room1");
        assert!(found);
        assert_eq!(peers, vec!["peer1".to_string()]);

        router.record_peer_unsubscribe("peer1", "room1");
        let (_, found) = router.lookup_peers_by_channel("room1");
        assert!(!found);
    }
}
