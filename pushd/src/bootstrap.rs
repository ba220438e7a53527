//! Startup orchestration: load config, build the broker and sinks, bind
//! listeners, spawn the worker pool, and wait for a shutdown signal (§5, §9).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use compio::net::TcpListener;
use socket2::{Domain, Socket, Type};

use pushd_core::prelude::*;

use crate::cli::Cli;
use crate::{config_loader, logging, s2s, session, stats};

pub async fn run(cli: Cli) -> Result<()> {
    let file_config = config_loader::load_config(&cli.config)?;
    let config = cli.apply_overrides(file_config);

    logging::init(&config.log_level);
    tracing::info!(
        tcp_listen_addr = %config.tcp_listen_addr,
        s2s_listen_addr = %config.s2s_listen_addr,
        workers = config.resolved_workers(),
        dist_mode = config.is_dist_mode(),
        "starting pushd"
    );

    let token_pool = Arc::new(InMemoryTokenPool::new());
    for token in &cli.auth_tokens {
        token_pool.issue(token.clone());
    }
    let authenticator: Arc<dyn ClientAuthenticator> = token_pool;

    let user_store = Arc::new(InMemoryUserStore::new());
    for (app_id, secret_key) in cli.parsed_peer_credentials() {
        user_store.seed_secret(app_id, secret_key);
    }

    // `Broker::publish` gates every enqueue on `config.enable_storage()`, so
    // the sink itself is sized the same either way: with storage disabled it
    // simply never receives anything.
    let (persistence, persistence_rx) = LoggingPersistenceSink::new(4096);
    let stats_sink: Arc<dyn StatsSink> = Arc::new(TracingStatsSink);

    let (broker, queues) = Broker::new(config.clone(), persistence, user_store);

    compio::runtime::spawn(LoggingPersistenceSink::run_drain(persistence_rx));
    compio::runtime::spawn(stats::run(broker.clone(), stats_sink, config.stats_output_interval()));
    compio::runtime::spawn(s2s::run_outbound(broker.clone(), queues));

    let s2s_listener = TcpListener::bind(&config.s2s_listen_addr).await.map_err(PushdError::Io)?;
    compio::runtime::spawn(s2s::accept_loop(s2s_listener, broker.clone()));

    for peer_addr in &config.peers {
        compio::runtime::spawn(s2s::connect_loop(peer_addr.clone(), broker.clone()));
    }

    spawn_client_workers(&config, &broker, authenticator)?;

    wait_for_shutdown().await;
    tracing::info!("shutdown signal received, closing sessions");
    shutdown(&broker);

    Ok(())
}

/// Binds `config.resolved_workers()` independent `SO_REUSEPORT` listeners
/// on `tcp_listen_addr`, one per worker OS thread, so the kernel
/// round-robins new connections across workers at accept time (§5). The
/// first worker runs on the current (main) thread's runtime; the rest each
/// get their own OS thread and single-threaded `compio::runtime::Runtime`,
/// grounded on `monocoque/benches/multithreaded.rs`'s
/// `std::thread::spawn(|| Runtime::new().block_on(...))` pattern.
fn spawn_client_workers(config: &Config, broker: &Arc<Broker>, authenticator: Arc<dyn ClientAuthenticator>) -> Result<()> {
    let workers = config.resolved_workers().max(1);
    let addr: SocketAddr = config
        .tcp_listen_addr
        .parse()
        .map_err(|e| PushdError::Config(format!("invalid tcp_listen_addr {}: {e}", config.tcp_listen_addr)))?;

    for _ in 1..workers {
        let broker = broker.clone();
        let authenticator = authenticator.clone();
        let std_listener = bind_reuseport_listener(addr).map_err(PushdError::Io)?;
        std::thread::spawn(move || {
            let rt = compio::runtime::Runtime::new().expect("failed to start worker runtime");
            rt.block_on(async move {
                let listener = TcpListener::from_std(std_listener).expect("failed to attach worker listener");
                session::accept_loop(listener, broker, authenticator).await;
            });
        });
    }

    let main_std_listener = bind_reuseport_listener(addr).map_err(PushdError::Io)?;
    let main_listener = TcpListener::from_std(main_std_listener).map_err(PushdError::Io)?;
    compio::runtime::spawn(session::accept_loop(main_listener, broker.clone(), authenticator));

    Ok(())
}

fn bind_reuseport_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Waits for an external shutdown request. Ctrl-C only in this revision:
/// true mid-accept cancellation of every worker's listener would need a
/// broadcast-cancel primitive this workspace's `compio` usage has never
/// exercised, so shutdown here closes all sessions and then exits the
/// process, matching the source's `os.Exit(0)` save for draining session
/// state first (§5).
async fn wait_for_shutdown() {
    if compio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to listen for ctrl-c, falling back to a long sleep");
        compio::time::sleep(Duration::from_secs(u64::MAX / 2)).await;
    }
}

fn shutdown(broker: &Arc<Broker>) {
    for uuid in broker.sessions.all_uuids() {
        if let Some(session) = broker.sessions.get(&uuid) {
            broker.close_session(&uuid, &session);
        }
    }
}
