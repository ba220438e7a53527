//! Pluggable persistence/stats sinks (C6, §4.6).
//!
//! The document store the source used (`user`, `user_info` collections in
//! MongoDB) is an out-of-scope external collaborator; what this crate owns
//! is the narrow trait boundary plus one in-process reference
//! implementation of each, so the broker is runnable standalone.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, DashSet};

/// One accepted publish, handed to the persistence sink. Mirrors the
/// source's `storage.MsgTuple`.
#[derive(Debug, Clone)]
pub struct MsgTuple {
    pub channel: String,
    pub msg: String,
    pub ts_ns: i64,
    pub uuid: String,
}

/// Asynchronous, best-effort fan-out of publish events to durable storage.
/// `enqueue` must never block the publish path; a full queue is a counted
/// drop, not an error surfaced to the publisher (§4.6, §7).
pub trait PersistenceSink: Send + Sync {
    fn enqueue(&self, tuple: MsgTuple) -> bool;

    fn dropped_count(&self) -> u64 {
        0
    }
}

/// In-memory reference sink: bounded ring via a `flume` channel, drained
/// by a background task that just logs at `debug`. A production
/// deployment swaps this for a sink that batches into the same durable
/// store the source queued into.
pub struct LoggingPersistenceSink {
    tx: flume::Sender<MsgTuple>,
    dropped: AtomicU64,
}

impl LoggingPersistenceSink {
    #[must_use]
    pub fn new(capacity: usize) -> (std::sync::Arc<Self>, flume::Receiver<MsgTuple>) {
        let (tx, rx) = flume::bounded(capacity);
        (
            std::sync::Arc::new(Self {
                tx,
                dropped: AtomicU64::new(0),
            }),
            rx,
        )
    }

    /// Drains queued tuples, logging each. Intended to be spawned once as
    /// a long-running task by the binary crate.
    pub async fn run_drain(rx: flume::Receiver<MsgTuple>) {
        while let Ok(tuple) = rx.recv_async().await {
            tracing::debug!(
                channel = %tuple.channel,
                uuid = %tuple.uuid,
                ts_ns = tuple.ts_ns,
                "persisted publish"
            );
        }
    }
}

impl PersistenceSink for LoggingPersistenceSink {
    fn enqueue(&self, tuple: MsgTuple) -> bool {
        match self.tx.try_send(tuple) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// S2S auth credential, looked up by appId (§4.5, §6, and the
/// `authServer` bugfix pinned in SPEC_FULL.md §9).
#[derive(Debug, Clone)]
pub struct Secret {
    pub secret_key: String,
}

/// Credential store + per-user last-seen tracker. The document store
/// backing a production deployment is the out-of-scope external
/// collaborator; this trait is the seam.
pub trait UserStore: Send + Sync {
    /// Fire-and-forget "last seen publishing on this channel" update
    /// (§4.3.4 step 5). Failures are logged, never surfaced.
    fn record_publish(&self, uuid: &str, channel: &str, ts_ns: i64);

    /// S2S AUTH lookup by the caller-supplied appId (not a hardcoded
    /// literal — see the authServer bugfix in SPEC_FULL.md §9).
    fn lookup_secret(&self, app_id: &str) -> Option<Secret>;
}

/// In-process reference `UserStore`, seeded from configuration at
/// startup (this node's own peers' credentials) and tracking last-seen
/// timestamps in a concurrent map instead of a document store.
#[derive(Default)]
pub struct InMemoryUserStore {
    secrets: DashMap<String, Secret>,
    last_seen: DashMap<(String, String), i64>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_secret(&self, app_id: impl Into<String>, secret_key: impl Into<String>) {
        self.secrets.insert(app_id.into(), Secret { secret_key: secret_key.into() });
    }

    #[must_use]
    pub fn last_seen(&self, uuid: &str, channel: &str) -> Option<i64> {
        self.last_seen.get(&(uuid.to_string(), channel.to_string())).map(|v| *v)
    }
}

impl UserStore for InMemoryUserStore {
    fn record_publish(&self, uuid: &str, channel: &str, ts_ns: i64) {
        self.last_seen.insert((uuid.to_string(), channel.to_string()), ts_ns);
    }

    fn lookup_secret(&self, app_id: &str) -> Option<Secret> {
        self.secrets.get(app_id).map(|e| e.value().clone())
    }
}

/// One-time client auth token, consumed on first successful use (§6 `AUTH
/// <token>`, grounded on `auth.go`'s `authClient`: a token issued
/// out-of-band is looked up in an LRU pool and deleted on success). The
/// backing issuance pool is the out-of-scope credential store; this trait
/// is the seam the session layer authenticates against.
pub trait ClientAuthenticator: Send + Sync {
    /// Returns `true` and consumes the token if it was valid and unused.
    fn authenticate(&self, token: &str) -> bool;
}

/// In-process reference authenticator: tokens are pre-seeded (e.g. from
/// configuration or an admin API in a real deployment) and removed from
/// the pool the first time they're presented, mirroring `tokenPool.Del`
/// in the source.
#[derive(Default)]
pub struct InMemoryTokenPool {
    tokens: DashSet<String>,
}

impl InMemoryTokenPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, token: impl Into<String>) {
        self.tokens.insert(token.into());
    }
}

impl ClientAuthenticator for InMemoryTokenPool {
    fn authenticate(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }
}

/// Periodic snapshot of broker-wide counters, flushed on
/// `StatsOutputInterval` (§6, §4.6, source's `Stats.Start`).
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub active_sessions: usize,
    pub channel_count: usize,
    pub publishes_total: u64,
    pub peers_up: usize,
    pub backpressure_drops: u64,
}

pub trait StatsSink: Send + Sync {
    fn report(&self, snapshot: StatsSnapshot);
}

/// Reference sink: structured `tracing` event instead of a bespoke log
/// format (the source wrote to a separate `MetricsLogfile`; here the same
/// subscriber that handles all other logging carries stats events too).
#[derive(Default)]
pub struct TracingStatsSink;

impl StatsSink for TracingStatsSink {
    fn report(&self, snapshot: StatsSnapshot) {
        tracing::info!(
            active_sessions = snapshot.active_sessions,
            channel_count = snapshot.channel_count,
            publishes_total = snapshot.publishes_total,
            peers_up = snapshot.peers_up,
            backpressure_drops = snapshot.backpressure_drops,
            "stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_store_lookup_uses_given_app_id() {
        let store = InMemoryUserStore::new();
        store.seed_secret("app-a", "secret-a");
        store.seed_secret("app-b", "secret-b");

        assert_eq!(store.lookup_secret("app-a").unwrap().secret_key, "secret-a");
        assert_eq!(store.lookup_secret("app-b").unwrap().secret_key, "secret-b");
        assert!(store.lookup_secret("app-c").is_none());
    }

    #[test]
    fn persistence_sink_counts_drops_on_overflow() {
        let (sink, _rx) = LoggingPersistenceSink::new(1);
        let tuple = |n: &str| MsgTuple {
            channel: "room1".to_string(),
            msg: n.to_string(),
            ts_ns: 0,
            uuid: "u".to_string(),
        };
        assert!(sink.enqueue(tuple("a")));
        assert!(!sink.enqueue(tuple("b")));
        assert_eq!(sink.dropped_count(), 1);
    }

    #[test]
    fn token_pool_is_one_time_use() {
        let pool = InMemoryTokenPool::new();
        pool.issue("tok-1");

        assert!(pool.authenticate("tok-1"));
        assert!(!pool.authenticate("tok-1"), "token must not be reusable");
        assert!(!pool.authenticate("unknown"));
    }
}
