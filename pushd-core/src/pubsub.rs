//! Pub/Sub core (C3) and the `Broker` value that owns process-wide state.
//!
//! Grounded on `engine/pubsub.go`'s `Subscribe`/`Unsubscribe`/
//! `UnsubscribeAllChannels`/`Publish`/`Publish2`/`Forward`, restructured
//! per the design notes (§9): state is a `Broker` value built at startup
//! rather than package-level singletons, so tests can construct as many
//! hermetic brokers as they like.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use flume::{Receiver, Sender};

use crate::channel::ChannelRegistry;
use crate::config::Config;
use crate::router::PeerRouter;
use crate::session::{Session, SessionRegistry};
use crate::sinks::{MsgTuple, PersistenceSink, StatsSnapshot, UserStore};

pub const OUTPUT_SUBSCRIBED: &str = "OUTPUT_SUBSCRIBED";
pub const OUTPUT_ALREADY_SUBSCRIBED: &str = "OUTPUT_ALREADY_SUBSCRIBED";
pub const OUTPUT_UNSUBSCRIBED: &str = "OUTPUT_UNSUBSCRIBED";
pub const OUTPUT_NOT_SUBSCRIBED: &str = "OUTPUT_NOT_SUBSCRIBED";
pub const OUTPUT_RCIV: &str = "OUTPUT_RCIV";

/// A publish destined for the S2S outbound text-publish queue
/// (`PubMsgChan`, §4.5).
#[derive(Debug, Clone)]
pub struct PublishTuple {
    pub channel: String,
    pub body: String,
    pub uuid: String,
    pub ts_ns: i64,
    pub msg_id: i64,
    pub peers: Vec<String>,
}

/// A pre-formatted control-plane publish for `PubMsgChan2` (Publish2).
#[derive(Debug, Clone)]
pub struct PublishTuple2 {
    pub channel: String,
    pub peers: Vec<String>,
    pub msg: String,
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}

/// The S2S outbound queue receivers, handed to the proxy task at startup
/// (§4.5). There is exactly one consumer per queue.
pub struct S2sOutboundQueues {
    pub sub_rx: Receiver<String>,
    pub unsub_rx: Receiver<String>,
    pub pub_rx: Receiver<PublishTuple>,
    pub pub_rx2: Receiver<PublishTuple2>,
}

/// Process-wide broker state (§9 design notes): session registry, channel
/// registry, peer router, and the S2S outbound queue senders, all in one
/// value constructed at startup.
pub struct Broker {
    pub sessions: SessionRegistry,
    pub channels: ChannelRegistry,
    pub router: PeerRouter,
    pub config: Config,
    pub persistence: Arc<dyn PersistenceSink>,
    pub user_store: Arc<dyn UserStore>,
    sub_tx: Sender<String>,
    unsub_tx: Sender<String>,
    pub_tx: Sender<PublishTuple>,
    pub_tx2: Sender<PublishTuple2>,
    publishes_total: AtomicU64,
    backpressure_drops: AtomicU64,
}

impl Broker {
    #[must_use]
    pub fn new(
        config: Config,
        persistence: Arc<dyn PersistenceSink>,
        user_store: Arc<dyn UserStore>,
    ) -> (Arc<Self>, S2sOutboundQueues) {
        let (sub_tx, sub_rx) = flume::bounded(1024);
        let (unsub_tx, unsub_rx) = flume::bounded(1024);
        let (pub_tx, pub_rx) = flume::bounded(4096);
        let (pub_tx2, pub_rx2) = flume::bounded(1024);

        let max_channel_items = config.max_channel_items;
        let broker = Arc::new(Self {
            sessions: SessionRegistry::new(),
            channels: ChannelRegistry::new(max_channel_items),
            router: PeerRouter::new(),
            config,
            persistence,
            user_store,
            sub_tx,
            unsub_tx,
            pub_tx,
            pub_tx2,
            publishes_total: AtomicU64::new(0),
            backpressure_drops: AtomicU64::new(0),
        });

        (
            broker,
            S2sOutboundQueues {
                sub_rx,
                unsub_rx,
                pub_rx,
                pub_rx2,
            },
        )
    }

    #[must_use]
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_sessions: self.sessions.len(),
            channel_count: self.channels.len(),
            publishes_total: self.publishes_total.load(Ordering::Relaxed),
            peers_up: self.router.all_peers().len(),
            backpressure_drops: self.backpressure_drops.load(Ordering::Relaxed),
        }
    }

    /// Enqueues a frame to `session`'s bounded writer; on overflow, applies
    /// the documented close-session backpressure policy instead of
    /// blocking the publish path (§9, writer.rs).
    fn deliver(&self, session: &Arc<Session>, frame: Bytes) {
        if !session.writer().try_send(frame) {
            self.backpressure_drops.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(uuid = %session.uuid, "backpressure drop, closing session");
            self.close_session(&session.uuid.clone(), session);
        }
    }

    /// 4.3.1 Subscribe(session, channel).
    pub fn subscribe(&self, session: &Arc<Session>, channel: &str) -> String {
        if session.has_subscription(channel) {
            return format!("{OUTPUT_ALREADY_SUBSCRIBED} {channel}");
        }
        session.insert_subscription(channel);
        let (members, created) = self.channels.get_or_create(channel);
        members.insert(session.clone());

        if created && self.config.is_dist_mode() {
            let _ = self.sub_tx.try_send(channel.to_string());
        }
        format!("{OUTPUT_SUBSCRIBED} {channel}")
    }

    /// 4.3.2 Unsubscribe(session, channel).
    pub fn unsubscribe(&self, session: &Arc<Session>, channel: &str) -> String {
        if !session.has_subscription(channel) {
            return format!("{OUTPUT_NOT_SUBSCRIBED} {channel}");
        }
        session.remove_subscription(channel);
        if let Some(members) = self.channels.get(channel) {
            members.remove(session.key());
            if self.channels.remove_if_empty(channel) && self.config.is_dist_mode() {
                let _ = self.unsub_tx.try_send(channel.to_string());
            }
        }
        format!("{OUTPUT_UNSUBSCRIBED} {channel}")
    }

    /// 4.3.3 UnsubscribeAll(session), called from Session::close.
    pub fn unsubscribe_all(&self, session: &Arc<Session>) {
        for channel in session.subscriptions_snapshot() {
            if let Some(members) = self.channels.get(&channel) {
                members.remove(session.key());
                if self.channels.remove_if_empty(&channel) && self.config.is_dist_mode() {
                    let _ = self.unsub_tx.try_send(channel.clone());
                }
            }
        }
        session.clear_subscriptions();
    }

    /// 4.3.4 Publish(channel, body, publisher_uuid, msgId, fromS2S) -> ack.
    pub fn publish(&self, channel: &str, body: &str, publisher_uuid: &str, msg_id: i64, from_s2s: bool) -> Option<String> {
        let ts = now_ns();

        if let Some(members) = self.channels.get(channel) {
            for member in members.snapshot() {
                if member.uuid == publisher_uuid {
                    continue;
                }
                let line = format!("{OUTPUT_RCIV} {channel} {publisher_uuid} {ts} {msg_id} {body}\n");
                self.deliver(&member, Bytes::from(line.into_bytes()));
            }
        }

        self.publishes_total.fetch_add(1, Ordering::Relaxed);

        if !from_s2s {
            if self.config.enable_storage() {
                self.persistence.enqueue(MsgTuple {
                    channel: channel.to_string(),
                    msg: body.to_string(),
                    ts_ns: ts,
                    uuid: publisher_uuid.to_string(),
                });
            }

            self.user_store.record_publish(publisher_uuid, channel, ts);

            if self.config.is_dist_mode() {
                let (peers, found) = self.router.lookup_peers_by_channel(channel);
                let peers = if found {
                    peers
                } else {
                    self.router.all_peers().into_iter().map(|p| p.addr.clone()).collect()
                };
                let _ = self.pub_tx.try_send(PublishTuple {
                    channel: channel.to_string(),
                    body: body.to_string(),
                    uuid: publisher_uuid.to_string(),
                    ts_ns: ts,
                    msg_id,
                    peers,
                });
            }
            Some(format!("{msg_id} {ts}"))
        } else {
            None
        }
    }

    /// 4.3.5 Forward: binary-framed variant of Publish. `frame` is an
    /// already wire-encoded binary forward frame (pushd-proto builds it);
    /// this just repeats the membership lookup and publisher suppression.
    /// No persistence, no stats, and S2S fanout is a pinned no-op in this
    /// revision (see SPEC_FULL.md §9 — the source left a TODO here).
    pub fn forward(&self, channel: &str, publisher_uuid: &str, frame: Bytes, _from_s2s: bool) {
        let Some(members) = self.channels.get(channel) else {
            return;
        };
        for member in members.snapshot() {
            if member.uuid == publisher_uuid {
                continue;
            }
            self.deliver(&member, frame.clone());
        }
    }

    /// 4.3.6 Publish2: administrative/control fan-out. No persistence.
    pub fn publish2(&self, channel: &str, msg: &str, skip_user_id: &str, force_other_node: bool) {
        if let Some(members) = self.channels.get(channel) {
            for member in members.snapshot() {
                if member.uuid == skip_user_id {
                    continue;
                }
                self.deliver(&member, Bytes::from(format!("{msg}\n").into_bytes()));
            }
        }

        if self.config.is_dist_mode() {
            let (peers, found) = self.router.lookup_peers_by_channel(channel);
            if found {
                let _ = self.pub_tx2.try_send(PublishTuple2 { channel: channel.to_string(), peers, msg: msg.to_string() });
            } else if force_other_node {
                let peers = self.router.all_peers().into_iter().map(|p| p.addr.clone()).collect();
                let _ = self.pub_tx2.try_send(PublishTuple2 { channel: channel.to_string(), peers, msg: msg.to_string() });
            }
        }
    }

    /// Closes a session: UnsubscribeAll, mark closed, compare-and-remove
    /// from the session registry (§4.1, client.go's `Close`).
    pub fn close_session(&self, uuid: &str, session: &Arc<Session>) {
        self.unsubscribe_all(session);
        session.mark_closed();
        self.sessions.remove(uuid, session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKind;
    use crate::sinks::{InMemoryUserStore, LoggingPersistenceSink};
    use crate::writer::SessionWriter;

    fn test_broker() -> Arc<Broker> {
        let (persistence, _rx) = LoggingPersistenceSink::new(64);
        let user_store = Arc::new(InMemoryUserStore::new());
        let (broker, _queues) = Broker::new(Config::default(), persistence, user_store);
        broker
    }

    fn session(uuid: &str, key: &str) -> (Arc<Session>, Receiver<Bytes>) {
        let (writer, rx) = SessionWriter::new(16);
        (Session::new(uuid, SessionKind::Client, key, writer), rx)
    }

    #[test]
    fn scenario_1_publisher_suppressed_subscriber_receives() {
        let broker = test_broker();
        let (a, a_rx) = session("a", "addr-a");
        let (b, b_rx) = session("b", "addr-b");

        assert_eq!(broker.subscribe(&a, "room1"), "OUTPUT_SUBSCRIBED room1");
        assert_eq!(broker.subscribe(&b, "room1"), "OUTPUT_SUBSCRIBED room1");

        let ack = broker.publish("room1", "hi", "a", 7, false).unwrap();
        assert!(ack.starts_with("7 "));

        assert!(a_rx.try_recv().is_err(), "publisher must not receive its own publish");
        let delivered = b_rx.try_recv().unwrap();
        let text = String::from_utf8(delivered.to_vec()).unwrap();
        assert!(text.starts_with("OUTPUT_RCIV room1 a "));
        assert!(text.trim_end().ends_with("7 hi"));
    }

    #[test]
    fn scenario_2_double_subscribe_is_idempotent() {
        let broker = test_broker();
        let (a, _rx) = session("a", "addr-a");

        assert_eq!(broker.subscribe(&a, "room1"), "OUTPUT_SUBSCRIBED room1");
        assert_eq!(broker.subscribe(&a, "room1"), "OUTPUT_ALREADY_SUBSCRIBED room1");

        let members = broker.channels.get("room1").unwrap();
        assert_eq!(members.len(), 1);
    }

    #[test]
    fn scenario_3_close_empties_and_removes_channel() {
        let broker = test_broker();
        let (a, _rx) = session("a", "addr-a");

        broker.subscribe(&a, "room1");
        broker.close_session("a", &a);

        assert!(broker.channels.get("room1").is_none());
        assert!(broker.sessions.get("a").is_none());
    }

    #[test]
    fn scenario_5_broadcast_when_no_known_interest() {
        let mut config = Config::default();
        config.is_dist_mode = true;
        let (persistence, _rx) = LoggingPersistenceSink::new(64);
        let user_store = Arc::new(InMemoryUserStore::new());
        let (broker, queues) = Broker::new(config, persistence, user_store);

        broker.router.add_peer("peer1", SessionWriter::new(8).0);
        broker.router.add_peer("peer2", SessionWriter::new(8).0);

        broker.publish("room42", "hello", "a", 1, false);

        let tuple = queues.pub_rx.try_recv().unwrap();
        assert_eq!(tuple.peers.len(), 2);
    }

    #[test]
    fn p4_from_s2s_publish_has_no_ack_and_no_outbound_fanout() {
        let mut config = Config::default();
        config.is_dist_mode = true;
        config.enable_storage = true;
        let (persistence, persistence_rx) = LoggingPersistenceSink::new(64);
        let user_store = Arc::new(InMemoryUserStore::new());
        let (broker, queues) = Broker::new(config, persistence, user_store);
        broker.router.add_peer("peer1", SessionWriter::new(8).0);

        let ack = broker.publish("room1", "hi", "remote-uuid", 1, true);
        assert!(ack.is_none());
        assert!(queues.pub_rx.try_recv().is_err());
        assert!(persistence_rx.try_recv().is_err(), "fromS2S publish must not reach the persistence sink");
    }

    #[test]
    fn p5_publisher_never_receives_forward_either() {
        let broker = test_broker();
        let (a, a_rx) = session("a", "addr-a");
        let (b, b_rx) = session("b", "addr-b");
        broker.subscribe(&a, "room1");
        broker.subscribe(&b, "room1");

        broker.forward("room1", "a", Bytes::from_static(b"frame"), false);
        assert!(a_rx.try_recv().is_err());
        assert_eq!(b_rx.try_recv().unwrap(), Bytes::from_static(b"frame"));
    }
}
