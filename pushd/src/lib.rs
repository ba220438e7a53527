//! # pushd
//!
//! Distributed publish/subscribe push server. This crate wires the
//! runtime-agnostic [`pushd_core`] broker and [`pushd_proto`] wire codecs
//! onto `compio`: TCP accept loops, the S2S peer overlay, and process
//! bootstrap (config, logging, stats, graceful shutdown).
//!
//! ## Architecture
//!
//! - `pushd-core`: session/channel/peer registries, the `Broker`, sinks
//! - `pushd-proto`: sans-IO line codec and client/S2S command parsers
//! - `pushd` (this crate): the `compio` accept loops and S2S overlay that
//!   turn those building blocks into a running server
//!
//! See `pushd::bootstrap::run` for the startup sequence.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::future_not_send)] // Runtime-agnostic design
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod bootstrap;
pub mod cli;
pub mod config_loader;
pub mod logging;
pub mod s2s;
pub mod session;
pub mod stats;

/// Development helper (benches/tests)
pub mod dev_tracing;
