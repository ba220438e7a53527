//! Client-facing accept loop and per-connection session handling (§5, §6).
//!
//! Grounded on `examples/router_worker_pool.rs`'s accept loop (`listener
//! .accept().await` -> `compio::runtime::spawn`) and `monocoque-zmtp`'s
//! read/write split: one task owns the read half and drives the protocol,
//! a second owns the write half and drains the session's bounded queue, so
//! a slow reader never stalls delivery to other subscribers and a slow
//! writer never stalls this session's own inbound dispatch.
//!
//! `compio::net::TcpStream` is cheaply `Clone` (both clones share the
//! underlying fd; reads and writes on a socket are independent kernel
//! operations), which is what lets the two tasks each hold their own
//! handle without a tokio-style `into_split`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use compio::buf::BufResult;
use compio::io::AsyncWriteExt;
use compio::net::{TcpListener, TcpStream};
use compio::time::timeout;

use pushd_core::prelude::*;
use pushd_core::timeout::write_all_with_timeout;
use pushd_proto::prelude::*;

/// Accepts client connections forever, spawning one local task per
/// connection. Never returns; errors on an individual `accept` are logged
/// and do not bring the loop down.
pub async fn accept_loop(listener: TcpListener, broker: Arc<Broker>, authenticator: Arc<dyn ClientAuthenticator>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let broker = broker.clone();
                let authenticator = authenticator.clone();
                compio::runtime::spawn(async move {
                    handle_connection(stream, addr.to_string(), broker, authenticator).await;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "client accept failed");
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, peer_addr: String, broker: Arc<Broker>, authenticator: Arc<dyn ClientAuthenticator>) {
    if let Err(e) = pushd_core::tcp::enable_tcp_nodelay(&stream) {
        tracing::debug!(peer = %peer_addr, error = %e, "failed to set TCP_NODELAY");
    }

    let mut reader = LineReader::new();
    let conn_timeout = broker.config.conn_timeout();

    let Some(line) = read_line(&mut reader, &mut stream, conn_timeout).await else {
        return;
    };
    let Ok(line) = std::str::from_utf8(&line) else {
        return;
    };

    let (token, uuid) = match parse_client_command(line) {
        Ok(ClientCommand::Auth { token, uuid }) => (token, uuid),
        _ => {
            tracing::debug!(peer = %peer_addr, "first line was not AUTH, closing");
            return;
        }
    };

    if !authenticator.authenticate(&token) {
        let _ = write_all_with_timeout(&mut stream, Bytes::from(format!("{AUTH_FAILED}\n").into_bytes()), Some(conn_timeout)).await;
        return;
    }

    let (writer, rx) = SessionWriter::new(broker.config.writer_capacity);
    let session = Session::new(uuid.clone(), SessionKind::Client, peer_addr.clone(), writer);
    session.set_authed();

    if let Some(previous) = broker.sessions.register(uuid.clone(), session.clone()) {
        tracing::info!(uuid = %uuid, "superseding previous session for this uuid");
        broker.close_session(&uuid, &previous);
    }

    let sent_ok = matches!(
        write_all_with_timeout(&mut stream, Bytes::from(format!("{AUTH_OK}\n").into_bytes()), Some(conn_timeout)).await,
        Ok(BufResult(Ok(()), _))
    );
    if !sent_ok {
        broker.close_session(&uuid, &session);
        return;
    }

    let write_stream = stream.clone();
    compio::runtime::spawn(write_pump(write_stream, rx));

    run_dispatch_loop(&mut stream, &mut reader, &broker, &session).await;

    broker.close_session(&uuid, &session);
}

async fn run_dispatch_loop(stream: &mut TcpStream, reader: &mut LineReader, broker: &Arc<Broker>, session: &Arc<Session>) {
    let session_timeout = broker.config.session_timeout();

    loop {
        if session.is_closed() {
            return;
        }

        let Some(line) = read_line(reader, stream, session_timeout).await else {
            return;
        };
        let Ok(line) = std::str::from_utf8(&line) else {
            tracing::debug!(uuid = %session.uuid, "non-utf8 line, closing");
            return;
        };

        let command = match parse_client_command(line) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(uuid = %session.uuid, error = %e, "malformed command, closing");
                return;
            }
        };

        match command {
            ClientCommand::Auth { .. } => {
                tracing::debug!(uuid = %session.uuid, "unexpected AUTH on an already-authed session, closing");
                return;
            }
            ClientCommand::Sub { channel } => {
                let ack = broker.subscribe(session, &channel);
                if !send_ack(session, ack) {
                    return;
                }
            }
            ClientCommand::Unsub { channel } => {
                let ack = broker.unsubscribe(session, &channel);
                if !send_ack(session, ack) {
                    return;
                }
            }
            ClientCommand::Pub { channel, msg_id, body } => {
                if let Some(ack) = broker.publish(&channel, &body, &session.uuid, msg_id, false) {
                    if !send_ack(session, ack) {
                        return;
                    }
                }
            }
            ClientCommand::Pub2 { channel, skip_user_id, force_other_node, body } => {
                broker.publish2(&channel, &body, &skip_user_id, force_other_node);
            }
            ClientCommand::Forward { channel, len } => {
                let raw = match reader.read_exact_n(stream, len).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        tracing::debug!(uuid = %session.uuid, error = %e, "failed to read FORWARD payload, closing");
                        return;
                    }
                };
                let frame = encode_forward_frame(&session.uuid, &channel, &raw);
                broker.forward(&channel, &session.uuid, frame, false);
            }
            ClientCommand::Ping => {
                if !session.writer().try_send(Bytes::from_static(b"PONG\n")) {
                    return;
                }
            }
        }
    }
}

fn send_ack(session: &Arc<Session>, ack: String) -> bool {
    session.writer().try_send(Bytes::from(format!("{ack}\n").into_bytes()))
}

/// Drains a session's outbound queue into the socket until the sender side
/// disconnects (the session closed) or a write fails.
async fn write_pump(mut stream: TcpStream, rx: flume::Receiver<Bytes>) {
    while let Ok(frame) = rx.recv_async().await {
        if stream.write_all(frame).await.0.is_err() {
            break;
        }
    }
    let _ = stream.shutdown().await;
}

/// Reads one line, bounded by `dur`. `None` covers every reason to stop
/// looping: timeout, clean EOF, or an IO error — all logged by the caller
/// at most once via the `Some`/`None` branch they're already in.
async fn read_line(reader: &mut LineReader, stream: &mut TcpStream, dur: Duration) -> Option<Bytes> {
    match timeout(dur, reader.next_line(stream)).await {
        Ok(Ok(Some(line))) => Some(line),
        Ok(Ok(None)) => None,
        Ok(Err(_)) => None,
        Err(_) => None,
    }
}
