//! S2S peer overlay: inbound peer acceptor, outbound peer connector with
//! reconnection backoff, and the outbound queue multiplexer that drains
//! the broker's four S2S queues onto the wire (§4.4, §4.5, §4.7).
//!
//! Peer connections are full-duplex once authenticated: whichever side
//! dialed sends `AUTH` once (fire-and-forget, no ack on the wire per §6);
//! from then on either side may send `SUB`/`UNSUB`/`PUB`/`PUB PUSH` over
//! the same socket. A node that configures both ends of a pair opens two
//! independent connections (one each direction), matching the source's
//! simple non-deduplicated peer model.
//!
//! Inbound-accepted peer connections are keyed in [`PeerRouter`] by the
//! observed socket address, not a configured listen address (the `AUTH`
//! line carries no callback address). When this key doesn't match what an
//! outbound dial registered for the same remote node, `lookup_peers_by_channel`
//! simply misses and `Broker::publish`/`publish2` fall back to broadcasting
//! to `all_peers()` (§4.3.4.6.a) — a documented, already-load-bearing
//! fallback, not a new failure mode.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use compio::buf::BufResult;
use compio::net::{TcpListener, TcpStream};
use compio::time::timeout;

use pushd_core::prelude::*;
use pushd_core::timeout::write_all_with_timeout;
use pushd_proto::prelude::*;

/// Accepts peer connections forever (§4.4: "a peer that dials us").
pub async fn accept_loop(listener: TcpListener, broker: Arc<Broker>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let broker = broker.clone();
                compio::runtime::spawn(async move {
                    handle_inbound_peer(stream, addr.to_string(), broker).await;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "peer accept failed");
            }
        }
    }
}

async fn handle_inbound_peer(mut stream: TcpStream, peer_addr: String, broker: Arc<Broker>) {
    let mut reader = LineReader::new();
    let conn_timeout = broker.config.conn_timeout();

    let Some(line) = read_line(&mut reader, &mut stream, conn_timeout).await else {
        return;
    };
    let Ok(line) = std::str::from_utf8(&line) else {
        return;
    };

    let (app_id, secret_key) = match parse_s2s_command(line) {
        Ok(S2sCommand::Auth { app_id, secret_key }) => (app_id, secret_key),
        _ => {
            tracing::debug!(peer = %peer_addr, "first S2S line was not AUTH, closing");
            return;
        }
    };

    match broker.user_store.lookup_secret(&app_id) {
        Some(secret) if secret.secret_key == secret_key => {}
        _ => {
            tracing::warn!(peer = %peer_addr, app_id = %app_id, "peer AUTH rejected");
            return;
        }
    }

    run_authed_peer_session(stream, peer_addr, broker).await;
}

/// Dials and maintains a connection to one configured peer forever,
/// reconnecting with exponential backoff on every drop (§4.7).
pub async fn connect_loop(addr: String, broker: Arc<Broker>) {
    let mut backoff = ReconnectState::new(Duration::from_millis(100), Duration::from_secs(30));

    loop {
        match TcpStream::connect(&addr).await {
            Ok(mut stream) => {
                let auth = format_s2s_command(&S2sCommand::Auth {
                    app_id: broker.config.app_id.clone(),
                    secret_key: broker.config.secret_key.clone(),
                });
                let line = Bytes::from(format!("{auth}\n").into_bytes());
                let sent_ok = matches!(
                    write_all_with_timeout(&mut stream, line, Some(broker.config.conn_timeout())).await,
                    Ok(BufResult(Ok(()), _))
                );
                if !sent_ok {
                    tracing::warn!(peer = %addr, "failed to send S2S AUTH");
                } else {
                    backoff.reset();
                    run_authed_peer_session(stream, addr.clone(), broker.clone()).await;
                }
            }
            Err(e) => {
                tracing::warn!(peer = %addr, error = %e, "peer dial failed");
            }
        }

        compio::time::sleep(backoff.next_delay()).await;
    }
}

/// Registers the peer, spawns its write-pump, and dispatches inbound
/// commands until the connection drops. Shared by both accept-side and
/// dial-side sessions since, once authed, the protocol is symmetric.
async fn run_authed_peer_session(stream: TcpStream, peer_addr: String, broker: Arc<Broker>) {
    let (writer, rx) = SessionWriter::new(broker.config.writer_capacity);
    let handle = broker.router.add_peer(peer_addr.clone(), writer);

    let write_stream = stream.clone();
    compio::runtime::spawn(peer_write_pump(write_stream, rx));

    let mut stream = stream;
    let mut reader = LineReader::new();
    let session_timeout = broker.config.session_timeout();

    loop {
        let Some(line) = read_line(&mut reader, &mut stream, session_timeout).await else {
            break;
        };
        let Ok(line) = std::str::from_utf8(&line) else {
            tracing::debug!(peer = %peer_addr, "non-utf8 S2S line, closing");
            break;
        };

        match parse_s2s_command(line) {
            Ok(S2sCommand::Auth { .. }) => {
                tracing::debug!(peer = %peer_addr, "ignoring repeated AUTH on an authed peer session");
            }
            Ok(S2sCommand::Sub { channel }) => broker.router.record_peer_subscribe(&peer_addr, &channel),
            Ok(S2sCommand::Unsub { channel }) => broker.router.record_peer_unsubscribe(&peer_addr, &channel),
            Ok(S2sCommand::Pub { channel, uuid, msg_id, body, .. }) => {
                broker.publish(&channel, &body, &uuid, msg_id, true);
            }
            Ok(S2sCommand::PubPush { channel, body }) => {
                broker.publish2(&channel, &body, "", false);
            }
            Err(e) => {
                tracing::debug!(peer = %peer_addr, error = %e, "malformed S2S command, closing");
                break;
            }
        }
    }

    broker.router.remove_peer(&peer_addr, handle.epoch());
    broker.router.drop_peer_interest(&peer_addr);
}

async fn peer_write_pump(mut stream: TcpStream, rx: flume::Receiver<Bytes>) {
    use compio::io::AsyncWriteExt;
    while let Ok(frame) = rx.recv_async().await {
        if stream.write_all(frame).await.0.is_err() {
            break;
        }
    }
    let _ = stream.shutdown().await;
}

async fn read_line(reader: &mut LineReader, stream: &mut TcpStream, dur: Duration) -> Option<Bytes> {
    match timeout(dur, reader.next_line(stream)).await {
        Ok(Ok(Some(line))) => Some(line),
        _ => None,
    }
}

/// Drains the broker's four S2S outbound queues onto the wire (§4.5).
/// `SUB`/`UNSUB` broadcast to every known peer (they announce this node's
/// own newly gained/lost local interest); `PUB`/`PUB PUSH` already carry
/// their resolved peer list from `Broker::publish`/`publish2`.
pub async fn run_outbound(broker: Arc<Broker>, queues: S2sOutboundQueues) {
    let S2sOutboundQueues { sub_rx, unsub_rx, pub_rx, pub_rx2 } = queues;

    let sub_broker = broker.clone();
    let sub_task = compio::runtime::spawn(async move {
        while let Ok(channel) = sub_rx.recv_async().await {
            broadcast(&sub_broker, &format_s2s_command(&S2sCommand::Sub { channel }));
        }
    });

    let unsub_broker = broker.clone();
    let unsub_task = compio::runtime::spawn(async move {
        while let Ok(channel) = unsub_rx.recv_async().await {
            broadcast(&unsub_broker, &format_s2s_command(&S2sCommand::Unsub { channel }));
        }
    });

    let pub_broker = broker.clone();
    let pub_task = compio::runtime::spawn(async move {
        while let Ok(tuple) = pub_rx.recv_async().await {
            let line = format_s2s_command(&S2sCommand::Pub {
                channel: tuple.channel,
                uuid: tuple.uuid,
                ts_ns: tuple.ts_ns,
                msg_id: tuple.msg_id,
                body: tuple.body,
            });
            send_to(&pub_broker, &tuple.peers, &line);
        }
    });

    let pub2_broker = broker.clone();
    let pub2_task = compio::runtime::spawn(async move {
        while let Ok(tuple) = pub_rx2.recv_async().await {
            let line = format_s2s_command(&S2sCommand::PubPush { channel: tuple.channel, body: tuple.msg });
            send_to(&pub2_broker, &tuple.peers, &line);
        }
    });

    sub_task.await;
    unsub_task.await;
    pub_task.await;
    pub2_task.await;
}

fn broadcast(broker: &Arc<Broker>, line: &str) {
    for peer in broker.router.all_peers() {
        peer.writer().try_send(Bytes::from(format!("{line}\n").into_bytes()));
    }
}

fn send_to(broker: &Arc<Broker>, peers: &[String], line: &str) {
    for addr in peers {
        if let Some(peer) = broker.router.get_peer(addr) {
            peer.writer().try_send(Bytes::from(format!("{line}\n").into_bytes()));
        }
    }
}
