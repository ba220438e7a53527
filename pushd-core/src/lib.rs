//! Pushd Core
//!
//! Runtime-agnostic building blocks for the push broker:
//! - Session registry with compare-and-remove close semantics (`session`)
//! - Channel registry with bounded LRU residency (`channel`)
//! - Peer router with epoch-tagged ghost-peer protection (`router`)
//! - Pub/Sub core operations and the `Broker` value (`pubsub`)
//! - Bounded per-session writer queues (`writer`)
//! - Reconnection backoff for S2S peer dialing (`reconnect`)
//! - Configuration shape (`config`)
//! - Pluggable persistence/credential/stats sinks (`sinks`)
//! - TCP and timeout helpers (`tcp`, `timeout`)

#![deny(unsafe_code)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::needless_pass_by_ref_mut)]
#![allow(clippy::match_same_arms)]

pub mod channel;
pub mod config;
pub mod error;
pub mod pubsub;
pub mod reconnect;
pub mod router;
pub mod session;
pub mod sinks;
// tcp.rs sets its own unsafe_code allowance at the module level.
#[allow(unsafe_code)]
pub mod tcp;
pub mod timeout;
pub mod writer;

/// Small prelude for the `pushd-proto` and `pushd` crates.
pub mod prelude {
    pub use crate::channel::{ChannelEntry, ChannelRegistry};
    pub use crate::config::Config;
    pub use crate::error::{PushdError, Result};
    pub use crate::pubsub::{Broker, PublishTuple, PublishTuple2, S2sOutboundQueues};
    pub use crate::reconnect::{ReconnectError, ReconnectState};
    pub use crate::router::{PeerHandle, PeerRouter};
    pub use crate::session::{Session, SessionKind, SessionRegistry};
    pub use crate::sinks::{
        ClientAuthenticator, InMemoryTokenPool, InMemoryUserStore, LoggingPersistenceSink, MsgTuple, PersistenceSink, Secret,
        StatsSink, StatsSnapshot, TracingStatsSink, UserStore,
    };
    pub use crate::writer::SessionWriter;
}
